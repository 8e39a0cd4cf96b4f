use std::fmt::Display;

use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::utils::files::read_lines;

/// A single labeled example
///
/// Ids are stable across runs for the same dataset and split, and are the
/// keys prediction records are persisted under.
#[derive(Clone, Debug, Serialize, Deserialize, new)]
pub struct Item {
    /// The example identifier
    pub id: String,

    /// The raw input text
    pub text: String,

    /// The gold class id
    pub label: i64,
}

/// The dataset partitions
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Split {
    /// Training partition
    Train,

    /// Development partition
    Dev,

    /// Test partition
    Test,
}

impl TryFrom<&str> for Split {
    type Error = DatasetError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "train" => Ok(Split::Train),
            "dev" => Ok(Split::Dev),
            "test" => Ok(Split::Test),
            _ => Err(DatasetError::UnknownSplit(value.to_string())),
        }
    }
}

impl Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Split::Train => "train",
            Split::Dev => "dev",
            Split::Test => "test",
        };

        write!(f, "{}", name)
    }
}

/// Parse a split mode string into the splits it names
///
/// A mode is either a single split name ("train", "dev", "test") or an
/// underscore-joined combination ("dev_test"), meaning the concatenation of
/// those splits in listed order.
pub fn parse_mode(mode: &str) -> Result<Vec<Split>, DatasetError> {
    mode.split('_').map(Split::try_from).collect()
}

/// The train/dev/test partitions of one dataset
pub struct DataSplits {
    /// Training examples
    pub train: Vec<Item>,

    /// Development examples
    pub dev: Vec<Item>,

    /// Test examples
    pub test: Vec<Item>,
}

impl DataSplits {
    /// Borrow the examples of a single split
    pub fn split(&self, split: Split) -> &[Item] {
        match split {
            Split::Train => &self.train,
            Split::Dev => &self.dev,
            Split::Test => &self.test,
        }
    }

    /// Collect the examples named by a split mode, in listed order
    pub fn mode_data(&self, mode: &str) -> Result<Vec<Item>, DatasetError> {
        let mut data = Vec::new();

        for split in parse_mode(mode)? {
            data.extend_from_slice(self.split(split));
        }

        Ok(data)
    }

    /// Truncate every split to at most `limit` examples
    pub fn limit(mut self, limit: Option<usize>) -> Self {
        if let Some(limit) = limit {
            self.train.truncate(limit);
            self.dev.truncate(limit);
            self.test.truncate(limit);
        }

        self
    }
}

/// Load the train/dev/test partitions of a dataset
///
/// Expects `{data_dir}/{name}/{split}.csv` with `id,text,label` columns.
pub async fn load(data_dir: &str, name: &str) -> Result<DataSplits, DatasetError> {
    Ok(DataSplits {
        train: read_split(data_dir, name, Split::Train)?,
        dev: read_split(data_dir, name, Split::Dev)?,
        test: read_split(data_dir, name, Split::Test)?,
    })
}

/// Load the ordered class names for a dataset from `{data_dir}/{name}/labels.txt`
pub async fn class_labels(data_dir: &str, name: &str) -> std::io::Result<Vec<String>> {
    read_lines(&format!("{}/{}/labels.txt", data_dir, name)).await
}

fn read_split(data_dir: &str, name: &str, split: Split) -> Result<Vec<Item>, DatasetError> {
    let path = format!("{}/{}/{}.csv", data_dir, name, split);

    let mut reader = csv::Reader::from_path(&path).map_err(|source| DatasetError::Csv {
        path: path.clone(),
        source: Box::new(source),
    })?;

    reader
        .deserialize()
        .collect::<Result<Vec<Item>, _>>()
        .map_err(|source| DatasetError::Csv {
            path,
            source: Box::new(source),
        })
}

/// Dataset Error
#[derive(thiserror::Error, Debug)]
pub enum DatasetError {
    /// No split found for the given string
    #[error("no split found for {0}")]
    UnknownSplit(String),

    /// A dataset file is missing or malformed
    #[error("unable to read dataset file {path}: {source}")]
    Csv {
        /// The file that failed to read
        path: String,
        /// The underlying reader error
        source: Box<csv::Error>,
    },
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn splits() -> DataSplits {
        let item = |id: &str, label: i64| Item::new(id.to_string(), format!("text {}", id), label);

        DataSplits {
            train: vec![item("t-0", 0), item("t-1", 1)],
            dev: vec![item("d-0", 0), item("d-1", 1), item("d-2", 0)],
            test: vec![item("s-0", 1), item("s-1", 0)],
        }
    }

    #[test]
    fn parses_single_split_modes() {
        assert_eq!(parse_mode("train").unwrap(), vec![Split::Train]);
        assert_eq!(parse_mode("dev").unwrap(), vec![Split::Dev]);
        assert_eq!(parse_mode("test").unwrap(), vec![Split::Test]);
    }

    #[test]
    fn parses_compound_split_modes_in_listed_order() {
        assert_eq!(
            parse_mode("dev_test").unwrap(),
            vec![Split::Dev, Split::Test]
        );
        assert_eq!(
            parse_mode("test_dev_train").unwrap(),
            vec![Split::Test, Split::Dev, Split::Train]
        );
    }

    #[test]
    fn rejects_unknown_splits() {
        assert!(matches!(
            parse_mode("validation"),
            Err(DatasetError::UnknownSplit(_))
        ));
        assert!(matches!(
            parse_mode("dev_validation"),
            Err(DatasetError::UnknownSplit(_))
        ));
    }

    #[test]
    fn mode_data_concatenates_in_order() {
        let data = splits().mode_data("dev_test").unwrap();

        let ids: Vec<&str> = data.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["d-0", "d-1", "d-2", "s-0", "s-1"]);
    }

    #[test]
    fn limit_truncates_every_split() {
        let limited = splits().limit(Some(1));

        assert_eq!(limited.train.len(), 1);
        assert_eq!(limited.dev.len(), 1);
        assert_eq!(limited.test.len(), 1);
    }

    #[test]
    fn limit_none_is_a_noop() {
        let full = splits().limit(None);

        assert_eq!(full.dev.len(), 3);
    }

    #[tokio::test]
    async fn loads_csv_splits() {
        let dir = std::env::temp_dir().join("burn-classify-datasets-load");
        std::fs::create_dir_all(dir.join("toy")).unwrap();

        for split in ["train", "dev", "test"] {
            std::fs::write(
                dir.join("toy").join(format!("{}.csv", split)),
                "id,text,label\na-0,first example,0\na-1,second example,1\n",
            )
            .unwrap();
        }

        let splits = load(dir.to_str().unwrap(), "toy").await.unwrap();

        assert_eq!(splits.train.len(), 2);
        assert_eq!(splits.dev[1].id, "a-1");
        assert_eq!(splits.test[1].label, 1);
    }

    #[tokio::test]
    async fn missing_csv_is_an_error() {
        let dir = std::env::temp_dir().join("burn-classify-datasets-missing");
        std::fs::create_dir_all(&dir).unwrap();

        assert!(matches!(
            load(dir.to_str().unwrap(), "nope").await,
            Err(DatasetError::Csv { .. })
        ));
    }
}
