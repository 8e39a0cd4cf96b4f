use std::path::PathBuf;

use burn::{
    module::{AutodiffModule, Module},
    optim::{AdamWConfig, GradientsParams, Optimizer},
    record::{CompactRecorder, Recorder},
    tensor::{backend::AutodiffBackend, backend::Backend, ElementConversion},
};

use crate::{
    datasets::{self, Item},
    errors::{Error, Result},
    experiment::{ExperimentConfig, ExperimentDir, Perf, TrainConfig, MODEL_ARGS, TRAIN_ARGS},
    models::PooledClassifier,
};

use super::{batcher::Batcher, components, output::RunStrategy, probs};

/// The checkpoint slot the best model is persisted under
pub static BASE_WEIGHTS: &str = "base";

/// The best dev-accuracy epoch seen so far
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestEpoch {
    /// The epoch index, -1 before any epoch was evaluated
    pub epoch: i64,

    /// Dev loss at that epoch
    pub loss: f32,

    /// Dev accuracy at that epoch
    pub acc: f32,
}

/// Patience-based stopping rule over per-epoch dev accuracy
#[derive(Debug)]
pub struct EarlyStopping {
    best: BestEpoch,
    patience: usize,
}

impl EarlyStopping {
    /// Create a tracker tolerating `patience` epochs without improvement
    pub fn new(patience: usize) -> Self {
        Self {
            best: BestEpoch {
                epoch: -1,
                loss: f32::INFINITY,
                acc: 0.0,
            },
            patience,
        }
    }

    /// Record this epoch's dev performance; true on strict improvement
    pub fn improved(&mut self, epoch: usize, perf: Perf) -> bool {
        if perf.acc > self.best.acc {
            self.best = BestEpoch {
                epoch: epoch as i64,
                loss: perf.loss,
                acc: perf.acc,
            };

            return true;
        }

        false
    }

    /// Whether `patience` epochs have passed since the best one
    pub fn should_stop(&self, epoch: usize) -> bool {
        epoch as i64 - self.best.epoch >= self.patience as i64
    }

    /// The best epoch recorded so far
    pub fn best(&self) -> BestEpoch {
        self.best
    }
}

/// Drives training for one experiment run
///
/// Creates the run directory, persists both configs, and owns the epoch
/// loop: a shuffled gradient pass over the training split, then a
/// deterministic dev and test pass, with save-best-on-dev semantics and
/// patience-based stopping.
pub struct Trainer {
    dir: ExperimentDir,
    config: ExperimentConfig,
    strategy: RunStrategy,
}

impl Trainer {
    /// Create the run directory and persist the experiment config
    pub fn new(root: impl Into<PathBuf>, config: ExperimentConfig) -> Result<Self> {
        let dir = ExperimentDir::create(root)?;
        dir.save_args(MODEL_ARGS, &config)?;

        Ok(Self {
            dir,
            config,
            strategy: RunStrategy::Standard,
        })
    }

    /// Select an output strategy other than the standard one
    pub fn with_strategy(mut self, strategy: RunStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// The run directory
    pub fn dir(&self) -> &ExperimentDir {
        &self.dir
    }

    /// Run the full training loop
    ///
    /// Returns the test performance of the last epoch evaluated, not
    /// necessarily the best dev epoch's.
    pub async fn train<B: AutodiffBackend>(
        &mut self,
        args: &TrainConfig,
        device: &B::Device,
    ) -> Result<Perf> {
        if args.num_epochs == 0 {
            return Err(Error::InvalidArgument("num_epochs must be > 0".to_string()));
        }

        self.dir.save_args(TRAIN_ARGS, args)?;

        let splits = datasets::load(&args.data_dir, &args.dataset)
            .await?
            .limit(args.limit);

        let comps = components::<B>(&self.config, device)?;
        let mut model = comps.model;
        let batcher = comps.batcher;
        let eval_batcher = Batcher::<B::InnerBackend>::new(
            comps.tokenizer,
            self.config.max_seq_len,
            comps.arch.pad_token_id(),
            device.clone(),
        );

        let mut optim = AdamWConfig::new().init();
        let mut stopper = EarlyStopping::new(args.patience);
        let mut test_perf = Perf::default();

        for epoch in 0..args.num_epochs {
            self.dir.reset_metrics();

            for (k, batch) in batcher
                .batches(&splits.train, args.batch_size, true)?
                .into_iter()
                .enumerate()
            {
                let output = self.strategy.model_output(&model, batch);

                let loss = output.loss.clone().into_scalar().elem::<f32>();
                let grads = GradientsParams::from_grads(output.loss.backward(), &model);
                model = optim.step(args.learning_rate, model, grads);

                self.dir.update_avg_metrics(loss);
                self.dir.update_acc_metrics(output.hits, output.num_preds);

                if (k + 1) % args.log_every == 0 {
                    self.dir.print_perf("train", epoch, k + 1);
                }
            }

            let model_valid = model.valid();
            let dev_perf = self.evaluate(&model_valid, &eval_batcher, &splits.dev, epoch, "dev")?;
            test_perf = self.evaluate(&model_valid, &eval_batcher, &splits.test, epoch, "test")?;

            if stopper.improved(epoch, dev_perf) {
                if args.save_model {
                    self.save_weights(&model_valid)?;
                } else {
                    let record = probs::generate(
                        &model_valid,
                        &self.strategy,
                        &eval_batcher,
                        &splits.test,
                    )?;
                    self.dir.save_probs(&record, &args.dataset, "test")?;
                }
            }

            if stopper.should_stop(epoch) {
                break;
            }
        }

        self.dir
            .log(&format!("best dev epoch: {:?}", stopper.best()))?;

        Ok(test_perf)
    }

    /// One deterministic pass over a split: batch size 1, no shuffle, no
    /// gradient
    fn evaluate<B: Backend>(
        &mut self,
        model: &PooledClassifier<B>,
        batcher: &Batcher<B>,
        data: &[Item],
        epoch: usize,
        mode: &str,
    ) -> Result<Perf> {
        self.dir.reset_metrics();

        for batch in batcher.batches(data, 1, false)? {
            let output = self.strategy.model_output(model, batch);

            self.dir
                .update_avg_metrics(output.loss.into_scalar().elem::<f32>());
            self.dir.update_acc_metrics(output.hits, output.num_preds);
        }

        Ok(self.dir.print_perf(mode, epoch, 0))
    }

    fn save_weights<B: Backend>(&self, model: &PooledClassifier<B>) -> Result<()> {
        CompactRecorder::new()
            .record(
                model.clone().into_record(),
                self.dir.weights_path(BASE_WEIGHTS),
            )
            .map_err(|e| Error::WeightsSave {
                name: BASE_WEIGHTS.to_string(),
                dir: self.dir.root().to_path_buf(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn stops_after_patience_epochs_without_improvement() {
        let dev_accs = [0.5, 0.6, 0.55, 0.55, 0.55];
        let mut stopper = EarlyStopping::new(3);
        let mut stopped_at = None;

        for (epoch, acc) in dev_accs.iter().enumerate() {
            stopper.improved(
                epoch,
                Perf {
                    loss: 1.0 - acc,
                    acc: *acc,
                },
            );

            if stopper.should_stop(epoch) {
                stopped_at = Some(epoch);
                break;
            }
        }

        assert_eq!(stopped_at, Some(4));

        let best = stopper.best();
        assert_eq!(best.epoch, 1);
        assert!((best.acc - 0.6).abs() < 1e-6);
        assert!((best.loss - 0.4).abs() < 1e-6);
    }

    #[test]
    fn improvement_requires_a_strict_increase() {
        let mut stopper = EarlyStopping::new(3);

        assert!(stopper.improved(0, Perf { loss: 0.9, acc: 0.5 }));
        assert!(!stopper.improved(1, Perf { loss: 0.1, acc: 0.5 }));

        // the tied epoch must not displace the recorded best
        assert_eq!(stopper.best().epoch, 0);
        assert!((stopper.best().loss - 0.9).abs() < 1e-6);
    }

    #[test]
    fn runs_to_the_epoch_cap_while_improving() {
        let mut stopper = EarlyStopping::new(3);

        for epoch in 0..10 {
            stopper.improved(
                epoch,
                Perf {
                    loss: 0.5,
                    acc: epoch as f32 / 10.0,
                },
            );
            assert!(!stopper.should_stop(epoch));
        }
    }

    #[tokio::test]
    #[ignore] // needs the bert-base-uncased tokenizer cache (network on first run)
    async fn trains_and_persists_artifacts_end_to_end() {
        use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};

        let root = std::env::temp_dir().join("burn-classify-train").join("e2e");
        let _ = std::fs::remove_dir_all(&root);
        let data_dir = root.join("data");
        std::fs::create_dir_all(data_dir.join("toy")).unwrap();

        std::fs::write(
            data_dir.join("toy").join("train.csv"),
            "id,text,label\n\
             tr-0,hello world,0\ntr-1,tiny example,1\n\
             tr-2,hello example,0\ntr-3,tiny world,1\n",
        )
        .unwrap();
        // identical dev texts with opposing labels pin dev accuracy at 0.5,
        // so the first epoch always counts as an improvement
        std::fs::write(
            data_dir.join("toy").join("dev.csv"),
            "id,text,label\nd-0,hello world,0\nd-1,hello world,1\n",
        )
        .unwrap();
        std::fs::write(
            data_dir.join("toy").join("test.csv"),
            "id,text,label\ns-0,hello world,1\ns-1,tiny example,0\n",
        )
        .unwrap();

        let device = NdArrayDevice::default();
        let config = ExperimentConfig::new("pooled-small".to_string())
            .with_max_seq_len(16)
            .with_num_classes(Some(2));

        let mut trainer = Trainer::new(root.join("run"), config).unwrap();
        let args = TrainConfig::new("toy".to_string())
            .with_num_epochs(2)
            .with_batch_size(4)
            .with_log_every(1)
            .with_data_dir(data_dir.to_str().unwrap().to_string());

        let perf = trainer
            .train::<Autodiff<NdArray>>(&args, &device)
            .await
            .unwrap();

        assert!(perf.loss.is_finite());
        assert!(trainer.dir().has_weights(BASE_WEIGHTS));

        // retraining with caching enabled materializes test predictions
        // instead of a checkpoint
        let args = args.with_save_model(false);
        trainer
            .train::<Autodiff<NdArray>>(&args, &device)
            .await
            .unwrap();

        assert!(trainer.dir().probs_exists("toy", "test"));
    }

    #[test]
    fn zero_accuracy_runs_never_mark_an_improvement() {
        let mut stopper = EarlyStopping::new(3);

        for epoch in 0..3 {
            assert!(!stopper.improved(epoch, Perf { loss: 1.0, acc: 0.0 }));
        }

        // epoch counting starts from the initial sentinel epoch of -1
        assert!(stopper.should_stop(2));
        assert_eq!(stopper.best().epoch, -1);
    }
}
