use oxidize_seq::io::{load_checkpoint, save_checkpoint, CheckpointError};
use oxidize_seq::nn::{ModelConfig, Sequence, SequenceModel};
use oxidize_seq::optim::Adam;
use oxidize_seq::train_step;

#[test]
fn trained_model_survives_checkpoint() {
    let mut model = SequenceModel::from_config(&ModelConfig::causal_decoder(8, 8, 5)).unwrap();
    let input = Sequence::Tokens(vec![0, 1, 2, 4, 3]);
    let mut optimizer = Adam::new(0.05);
    for _ in 0..20 {
        train_step(&mut model, &mut optimizer, &input, &[1, 2, 4, 3, 4]).unwrap();
    }

    let path = std::env::temp_dir().join(format!("oxidize-seq-e2e-{}.json", std::process::id()));
    save_checkpoint(&model, &path).unwrap();
    let restored = load_checkpoint(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let diff = restored
        .predict(&input)
        .unwrap()
        .max_abs_diff(&model.predict(&input).unwrap())
        .unwrap();
    assert!(diff < 1e-9, "restored logits differ by {diff}");
}

#[test]
fn corrupt_checkpoint_is_reported() {
    let path = std::env::temp_dir().join(format!("oxidize-seq-corrupt-{}.json", std::process::id()));
    std::fs::write(&path, "{ not json").unwrap();
    let err = load_checkpoint(&path).unwrap_err();
    std::fs::remove_file(&path).unwrap();
    assert!(matches!(err, CheckpointError::Json(_)));
}
