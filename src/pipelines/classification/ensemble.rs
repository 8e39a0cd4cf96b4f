use std::{collections::BTreeMap, path::Path};

use burn::tensor::backend::Backend;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

use super::{loader::RunHandle, probs::PredictionRecord};

/// The manifest file listing the seed runs of an ensemble
pub static MANIFEST: &str = "seeds.yaml";

/// Explicit listing of the seed runs composing an ensemble
///
/// Lives at the ensemble root as `seeds.yaml`; subdirectories not listed
/// here are never touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleManifest {
    /// Seed run directories, relative to the ensemble root
    pub seeds: Vec<String>,
}

impl EnsembleManifest {
    /// Load and validate the manifest under the given ensemble root
    pub fn load(root: &Path) -> Result<Self> {
        let config_load = |reason: String| Error::ConfigLoad {
            name: MANIFEST.to_string(),
            dir: root.to_path_buf(),
            reason,
        };

        let file = std::fs::File::open(root.join(MANIFEST))
            .map_err(|e| config_load(e.to_string()))?;
        let manifest: Self =
            serde_yaml::from_reader(file).map_err(|e| config_load(e.to_string()))?;

        if manifest.seeds.is_empty() {
            return Err(config_load("manifest lists no seeds".to_string()));
        }

        Ok(manifest)
    }

    /// Persist the manifest under the given ensemble root
    pub fn save(&self, root: &Path) -> Result<()> {
        let file = std::fs::File::create(root.join(MANIFEST))?;

        serde_yaml::to_writer(file, self).map_err(|e| {
            Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
    }
}

/// Averages cached predictions across independently trained seed runs
///
/// Each seed is an independent [`RunHandle`]; retrieval fans out across
/// them, which is safe because seeds share no mutable state and the mean
/// does not depend on retrieval order.
pub struct Ensemble<B: Backend> {
    names: Vec<String>,
    seeds: Vec<RunHandle<B>>,
}

impl<B: Backend> Ensemble<B> {
    /// Open every seed run listed in the manifest under `root`
    ///
    /// Fails if the manifest is missing or empty, or if any listed seed
    /// directory does not exist.
    pub fn open(root: impl AsRef<Path>, device: B::Device) -> Result<Self> {
        let root = root.as_ref();
        let manifest = EnsembleManifest::load(root)?;

        let mut seeds = Vec::with_capacity(manifest.seeds.len());
        for name in &manifest.seeds {
            seeds.push(RunHandle::open(root.join(name), device.clone())?);
        }

        Ok(Self {
            names: manifest.seeds,
            seeds,
        })
    }

    /// The seed names from the manifest
    pub fn seed_names(&self) -> &[String] {
        &self.names
    }

    /// Elementwise mean of every seed's probability vectors, per example
    ///
    /// Every seed must cover the identical example-id set; a partial
    /// result is never produced.
    pub async fn probs(&mut self, dataset: &str, mode: &str) -> Result<PredictionRecord> {
        let records = try_join_all(
            self.seeds
                .iter_mut()
                .map(|seed| seed.probs(dataset, mode)),
        )
        .await?;

        for (name, record) in self.names.iter().zip(&records).skip(1) {
            if !records[0].ids_match(record) {
                return Err(Error::Consistency {
                    seed: name.clone(),
                    reference: self.names[0].clone(),
                });
            }
        }

        Ok(PredictionRecord::mean(&records))
    }

    /// Each seed's individually derived predicted labels, unaggregated
    ///
    /// For per-seed diagnostics such as measuring seed variance; does not
    /// go through the averaging path.
    pub async fn seed_predicted_labels(
        &mut self,
        dataset: &str,
        mode: &str,
    ) -> Result<Vec<BTreeMap<String, usize>>> {
        try_join_all(
            self.seeds
                .iter_mut()
                .map(|seed| seed.predicted_labels(dataset, mode)),
        )
        .await
    }
}
