mod common;

use mnistmodel::checkpoint;
use mnistmodel::config::RunConfig;
use mnistmodel::data::{make_eval_input_fn, make_train_input_fn, Features};
use mnistmodel::estimator::Estimator;
use mnistmodel::export::{serving_input, ServingModel};
use mnistmodel::hparams::HParams;
use mnistmodel::Error;

fn linear_hparams(steps: u64) -> HParams {
    HParams {
        train_batch_size: 10,
        learning_rate: 0.05,
        train_steps: steps,
        ..HParams::default()
    }
}

fn config() -> RunConfig {
    RunConfig {
        save_checkpoints_steps: Some(10),
        eval_chunk_size: 16,
        log_every_steps: 5,
        ..RunConfig::default()
    }
}

#[test]
fn train_then_evaluate_learns_synthetic_digits() {
    let dir = tempfile::tempdir().unwrap();
    let data = common::synthetic_mnist();
    let hp = linear_hparams(40);
    let train = make_train_input_fn(&data, &hp);
    let eval = make_eval_input_fn(&data);

    let mut est = Estimator::new(dir.path(), config(), hp).unwrap();
    let before = est.evaluate(&eval, Some(1)).unwrap();
    assert_eq!(est.train(&train, 40).unwrap(), 40);
    let after = est.evaluate(&eval, Some(1)).unwrap();

    assert_eq!(after.global_step, 40);
    assert!(after.loss < before.loss);
    assert!(after.accuracy > 0.8, "accuracy {}", after.accuracy);
    assert!(dir.path().join("hparams.json").is_file());
    assert!(dir.path().join("metrics.jsonl").is_file());
    assert_eq!(
        checkpoint::latest(dir.path()).unwrap(),
        Some(dir.path().join("model.ckpt-40.json"))
    );
}

#[test]
fn restores_latest_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let data = common::synthetic_mnist();
    let hp = linear_hparams(25);
    let train = make_train_input_fn(&data, &hp);

    let mut first = Estimator::new(dir.path(), config(), hp.clone()).unwrap();
    first.train(&train, 25).unwrap();
    let expected = first.predict(&data.test.images).unwrap();
    drop(first);

    let mut second = Estimator::new(dir.path(), config(), hp.clone()).unwrap();
    assert_eq!(second.global_step(), 25);
    assert_eq!(second.predict(&data.test.images).unwrap(), expected);

    // already at the target: no extra steps
    assert_eq!(second.train(&train, 25).unwrap(), 25);
    assert_eq!(second.train(&train, 30).unwrap(), 30);

    let other = HParams {
        model: "dnn".into(),
        ..hp
    };
    assert!(matches!(
        Estimator::new(dir.path(), config(), other),
        Err(Error::Checkpoint { .. })
    ));
}

#[test]
fn keeps_at_most_keep_checkpoint_max() {
    let dir = tempfile::tempdir().unwrap();
    let data = common::synthetic_mnist();
    let hp = linear_hparams(50);
    let train = make_train_input_fn(&data, &hp);
    let cfg = RunConfig {
        save_checkpoints_steps: Some(5),
        keep_checkpoint_max: 3,
        ..config()
    };
    let mut est = Estimator::new(dir.path(), cfg, hp).unwrap();
    est.train(&train, 50).unwrap();

    let kept: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("model.ckpt-"))
        .collect();
    assert_eq!(kept.len(), 3);
    assert!(dir.path().join("model.ckpt-50.json").is_file());
    assert!(!dir.path().join("model.ckpt-35.json").exists());
}

#[test]
fn export_serves_same_predictions() {
    let dir = tempfile::tempdir().unwrap();
    let data = common::synthetic_mnist();
    let hp = HParams {
        model: "cnn".into(),
        ksize1: 3,
        ksize2: 3,
        nfil1: 2,
        nfil2: 3,
        batch_norm: true,
        ..linear_hparams(3)
    };
    let train = make_train_input_fn(&data, &hp);
    let mut est = Estimator::new(dir.path(), config(), hp.clone()).unwrap();
    est.train(&train, 3).unwrap();

    let export_dir = est.export_savedmodel(&dir.path().join("export").join("Servo")).unwrap();
    assert!(export_dir.join("saved_model.json").is_file());

    let images = data.test.images.slice_rows(0, 5);
    let expected = est.predict(&images).unwrap();

    let served = ServingModel::load(&dir.path().join("export").join("Servo")).unwrap();
    assert_eq!(served.hparams, hp);
    assert_eq!(served.global_step, 3);
    assert_eq!(served.signature.outputs, vec!["probabilities", "classes"]);
    let features = serving_input(images.data.clone(), &[5, 28, 28, 1]).unwrap();
    let got = served.predict(&features).unwrap();
    assert_eq!(got, expected);

    let direct = ServingModel::load(&export_dir).unwrap().with_chunk_size(2);
    let got = direct
        .predict(&Features { image: images })
        .unwrap();
    assert_eq!(got.classes, expected.classes);
}

#[test]
fn unknown_model_fails_before_training() {
    let dir = tempfile::tempdir().unwrap();
    let hp = HParams {
        model: "cnn3".into(),
        ..linear_hparams(1)
    };
    assert!(matches!(
        Estimator::new(dir.path(), config(), hp),
        Err(Error::UnknownModel { .. })
    ));
}
