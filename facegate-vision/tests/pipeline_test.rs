use anyhow::Result;
use facegate_vision::{model, similarity, Pipeline};
use image::DynamicImage;
use std::path::PathBuf;

fn model_dir() -> PathBuf {
    std::env::var_os("FACEGATE_MODEL_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("models"))
}

fn load_pipeline() -> Result<Option<Pipeline>> {
    let dir = model_dir();
    let detector = dir.join(model::DETECTOR_MODEL_FILE);
    let recognizer = dir.join(model::RECOGNIZER_MODEL_FILE);
    if !detector.exists() || !recognizer.exists() {
        eprintln!("Skipping: models not found in {}", dir.display());
        return Ok(None);
    }
    Ok(Some(Pipeline::new(&detector, &recognizer)?))
}

#[test]
fn test_missing_model_is_an_error() {
    let result = Pipeline::new(
        &PathBuf::from("/nonexistent/detector.onnx"),
        &PathBuf::from("/nonexistent/recognizer.onnx"),
    );
    let err = result.err().expect("loading absent models must fail");
    assert!(err.to_string().contains("not found"), "{}", err);
}

#[test]
fn test_blank_frame_falls_back_to_whole_image() -> Result<()> {
    env_logger::try_init().ok();
    let Some(mut pipeline) = load_pipeline()? else {
        return Ok(());
    };

    let blank = DynamicImage::new_rgb8(320, 240);
    assert!(pipeline.represent(&blank, true).is_err());

    let reps = pipeline.represent(&blank, false)?;
    assert_eq!(reps.len(), 1);
    assert!(reps[0].detection.is_none());
    assert_eq!(reps[0].embedding.len(), 128);
    Ok(())
}

#[test]
fn test_embedding_is_unit_length_and_self_similar() -> Result<()> {
    env_logger::try_init().ok();
    let Some(mut pipeline) = load_pipeline()? else {
        return Ok(());
    };

    let img = DynamicImage::ImageRgb8(image::RgbImage::from_fn(160, 160, |x, y| {
        image::Rgb([(x * 3 % 256) as u8, (y * 5 % 256) as u8, ((x + y) % 256) as u8])
    }));
    let embedding = pipeline.extract_embedding(&img, false)?;

    let norm: f32 = embedding.vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-3, "norm {}", norm);

    let again = pipeline.extract_embedding(&img, false)?;
    let sim = similarity::match_embedding(&embedding, &again).unwrap();
    assert!(sim > 0.999, "same image similarity {}", sim);
    Ok(())
}

/// Same-person pairs should clear the service threshold when sample faces are
/// provided in `$FACEGATE_TEST_FACES` as `<person><n>.png`.
#[test]
fn test_same_person_scores_higher_than_different_person() -> Result<()> {
    env_logger::try_init().ok();
    let Some(dir) = std::env::var_os("FACEGATE_TEST_FACES").map(PathBuf::from) else {
        eprintln!("Skipping: FACEGATE_TEST_FACES not set");
        return Ok(());
    };
    let Some(mut pipeline) = load_pipeline()? else {
        return Ok(());
    };

    let a1 = dir.join("a1.png");
    let a2 = dir.join("a2.png");
    let b1 = dir.join("b1.png");
    if !a1.exists() || !a2.exists() || !b1.exists() {
        eprintln!("Skipping: expected a1.png, a2.png, b1.png in {}", dir.display());
        return Ok(());
    }

    let e_a1 = pipeline.extract_embedding(&image::open(&a1)?, true)?;
    let e_a2 = pipeline.extract_embedding(&image::open(&a2)?, true)?;
    let e_b1 = pipeline.extract_embedding(&image::open(&b1)?, true)?;

    let same = similarity::match_embedding(&e_a1, &e_a2).unwrap();
    let diff = similarity::match_embedding(&e_a1, &e_b1).unwrap();
    println!("same: {:.4}, different: {:.4}", same, diff);
    assert!(same > diff);
    Ok(())
}
