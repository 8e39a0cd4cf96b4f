//! Command line tool to train a classification experiment

use anyhow::anyhow;
use burn::backend::{libtorch::LibTorchDevice, Autodiff, LibTorch};
use burn_classify::{
    datasets,
    experiment::{ExperimentConfig, TrainConfig},
    models::DEFAULT_ARCHITECTURE,
    pipelines::classification::Trainer,
};
use pico_args::Arguments;

const HELP: &str = "\
Usage: train DATASET [OPTIONS]

Arguments:
  DATASET              The dataset to train on (expects {data-dir}/DATASET/{train,dev,test}.csv)

Options:
  -h, --help           Print help
  -a, --arch           The architecture to use (e.g., 'pooled-base')
  -o, --out-dir        The run directory to create (defaults to 'experiments/DATASET')
  -n, --num-epochs     Maximum number of epochs to train for
  -b, --batch-size     Batch size
  -l, --learning-rate  Learning rate
  -d, --data-dir       The path to the top-level data directory (defaults to 'data')
      --max-seq-len    Maximum sequence length
      --limit          Truncate every split to this many examples
      --cache-probs    Cache test predictions on improvement instead of saving weights
      --device         Compute device (e.g., 'cuda:0' or 'cpu')
";

#[derive(Debug)]
struct Args {
    dataset: String,
    arch: Option<String>,
    out_dir: Option<String>,
    num_epochs: Option<usize>,
    batch_size: Option<usize>,
    learning_rate: Option<f64>,
    data_dir: Option<String>,
    max_seq_len: Option<usize>,
    limit: Option<usize>,
    cache_probs: bool,
    device: Option<String>,
}

impl Args {
    fn parse() -> anyhow::Result<Option<Self>> {
        let mut pargs = Arguments::from_env();

        // Help has a higher priority and should be handled separately.
        if pargs.contains(["-h", "--help"]) {
            return Ok(None);
        }

        let args = Args {
            arch: pargs.opt_value_from_str(["-a", "--arch"])?,
            out_dir: pargs.opt_value_from_str(["-o", "--out-dir"])?,
            num_epochs: pargs.opt_value_from_str(["-n", "--num-epochs"])?,
            batch_size: pargs.opt_value_from_str(["-b", "--batch-size"])?,
            learning_rate: pargs.opt_value_from_str(["-l", "--learning-rate"])?,
            data_dir: pargs.opt_value_from_str(["-d", "--data-dir"])?,
            max_seq_len: pargs.opt_value_from_str("--max-seq-len")?,
            limit: pargs.opt_value_from_str("--limit")?,
            cache_probs: pargs.contains("--cache-probs"),
            device: pargs.opt_value_from_str("--device")?,
            dataset: pargs.free_from_str().map_err(|e| match e {
                pico_args::Error::MissingArgument => anyhow!("Missing required argument: DATASET"),
                _ => anyhow!("{}", e),
            })?,
        };

        Ok(Some(args))
    }
}

fn parse_device(name: &str) -> anyhow::Result<LibTorchDevice> {
    if name == "cpu" {
        return Ok(LibTorchDevice::Cpu);
    }

    if let Some(index) = name.strip_prefix("cuda:") {
        return Ok(LibTorchDevice::Cuda(index.parse()?));
    }

    Err(anyhow!("unknown device: {}", name))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let output = Args::parse()?;

    if output.is_none() {
        print!("{}", HELP);

        return Ok(());
    }
    let args = output.unwrap();

    let arch = args
        .arch
        .clone()
        .unwrap_or_else(|| DEFAULT_ARCHITECTURE.to_string());
    let data_dir = args.data_dir.clone().unwrap_or_else(|| "data".to_string());

    let labels = datasets::class_labels(&data_dir, &args.dataset).await?;

    let mut config = ExperimentConfig::new(arch).with_num_classes(Some(labels.len()));

    if let Some(max_seq_len) = args.max_seq_len {
        config.max_seq_len = max_seq_len;
    }

    if let Some(device) = &args.device {
        config.device = device.clone();
    }

    let mut train_config = TrainConfig::new(args.dataset.clone())
        .with_data_dir(data_dir)
        .with_save_model(!args.cache_probs)
        .with_limit(args.limit);

    if let Some(num_epochs) = args.num_epochs {
        train_config.num_epochs = num_epochs;
    }

    if let Some(batch_size) = args.batch_size {
        train_config.batch_size = batch_size;
    }

    if let Some(learning_rate) = args.learning_rate {
        train_config.learning_rate = learning_rate;
    }

    let out_dir = args
        .out_dir
        .clone()
        .unwrap_or_else(|| format!("experiments/{}", args.dataset));
    let device = parse_device(&config.device)?;

    let mut trainer = Trainer::new(out_dir, config)?;
    let perf = trainer
        .train::<Autodiff<LibTorch>>(&train_config, &device)
        .await?;

    println!(
        "final test performance: loss {:.4} | acc {:.4}",
        perf.loss, perf.acc
    );

    Ok(())
}
