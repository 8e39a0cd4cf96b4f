use std::{
    fs::{File, OpenOptions},
    io::Write as _,
    path::{Path, PathBuf},
};

use burn::config::Config;

use crate::{
    errors::{Error, Result},
    experiment::metrics::{Perf, RunningMetrics},
    pipelines::classification::probs::PredictionRecord,
};

/// The subdirectory checkpoints are persisted under
static MODELS_DIR: &str = "models";

/// The subdirectory prediction records are persisted under
static PROBS_DIR: &str = "probs";

/// The file training milestones are appended to
static LOG_FILE: &str = "train.log";

/// One experiment run directory
///
/// Owns every persisted artifact of a run (configs, checkpoints, cached
/// prediction records, the run log) plus the running metrics accumulated
/// during training and evaluation passes.
pub struct ExperimentDir {
    root: PathBuf,
    metrics: RunningMetrics,
}

impl ExperimentDir {
    /// Create a run directory (and its checkpoint/prediction subdirectories)
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        std::fs::create_dir_all(root.join(MODELS_DIR))?;
        std::fs::create_dir_all(root.join(PROBS_DIR))?;

        Ok(Self {
            root,
            metrics: RunningMetrics::default(),
        })
    }

    /// Bind to an existing run directory
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        if !root.is_dir() {
            return Err(Error::RunDirMissing(root));
        }

        Ok(Self {
            root,
            metrics: RunningMetrics::default(),
        })
    }

    /// The root path of this run
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist a config under the given file name
    pub fn save_args<C: Config>(&self, name: &str, config: &C) -> Result<()> {
        config.save(self.root.join(name))?;

        Ok(())
    }

    /// Load a previously persisted config
    pub fn load_args<C: Config>(&self, name: &str) -> Result<C> {
        C::load(self.root.join(name)).map_err(|e| Error::ConfigLoad {
            name: name.to_string(),
            dir: self.root.clone(),
            reason: e.to_string(),
        })
    }

    /// The path of a checkpoint slot, without the recorder's extension
    pub fn weights_path(&self, name: &str) -> PathBuf {
        self.root.join(MODELS_DIR).join(name)
    }

    /// Whether a checkpoint exists in the given slot
    pub fn has_weights(&self, name: &str) -> bool {
        self.weights_path(name).with_extension("mpk").is_file()
    }

    /// The path a prediction record for (dataset, mode) is persisted under
    pub fn probs_path(&self, dataset: &str, mode: &str) -> PathBuf {
        self.root
            .join(PROBS_DIR)
            .join(format!("{}.{}.json", dataset, mode))
    }

    /// Whether a prediction record exists for (dataset, mode)
    pub fn probs_exists(&self, dataset: &str, mode: &str) -> bool {
        self.probs_path(dataset, mode).is_file()
    }

    /// Persist a prediction record for (dataset, mode)
    pub fn save_probs(
        &self,
        record: &PredictionRecord,
        dataset: &str,
        mode: &str,
    ) -> Result<()> {
        let write = || -> std::result::Result<(), String> {
            let file =
                File::create(self.probs_path(dataset, mode)).map_err(|e| e.to_string())?;
            serde_json::to_writer(file, record).map_err(|e| e.to_string())
        };

        write().map_err(|reason| Error::CacheWrite {
            dataset: dataset.to_string(),
            mode: mode.to_string(),
            reason,
        })
    }

    /// Load a previously persisted prediction record
    pub fn load_probs(&self, dataset: &str, mode: &str) -> Result<PredictionRecord> {
        let file = File::open(self.probs_path(dataset, mode))?;

        serde_json::from_reader(file).map_err(|e| {
            Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
    }

    /// Append a milestone to the run log
    pub fn log(&self, message: &str) -> Result<()> {
        log::info!("{}", message);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(LOG_FILE))?;
        writeln!(file, "{}", message)?;

        Ok(())
    }

    /// Clear the running metrics before a new pass
    pub fn reset_metrics(&mut self) {
        self.metrics.reset();
    }

    /// Fold one batch loss into the running average
    pub fn update_avg_metrics(&mut self, loss: f32) {
        self.metrics.update_avg(loss);
    }

    /// Fold one batch's hit counts into the running accuracy
    pub fn update_acc_metrics(&mut self, hits: usize, num_preds: usize) {
        self.metrics.update_acc(hits, num_preds);
    }

    /// Log and return the current aggregate performance
    pub fn print_perf(&self, mode: &str, epoch: usize, step: usize) -> Perf {
        let perf = self.metrics.perf();

        log::info!(
            "{:>5} | epoch {:>2} | step {:>5} | loss {:.4} | acc {:.4}",
            mode,
            epoch,
            step,
            perf.loss,
            perf.acc,
        );

        perf
    }
}
