//! Command line tool to inspect predictions from a trained run or ensemble

use std::collections::BTreeMap;

use anyhow::anyhow;
use burn::backend::{libtorch::LibTorchDevice, LibTorch};
use burn_classify::{
    datasets,
    pipelines::classification::{Ensemble, RunHandle},
};
use pico_args::Arguments;

const HELP: &str = "\
Usage: infer RUN_DIR DATASET [OPTIONS]

Arguments:
  RUN_DIR              A trained run directory, or an ensemble root with a seeds.yaml manifest
  DATASET              The dataset to predict on

Options:
  -h, --help           Print help
  -m, --mode           The split mode to predict on (e.g., 'test' or 'dev_test', defaults to 'test')
  -d, --data-dir       The path to the top-level data directory (defaults to 'data')
      --ensemble       Treat RUN_DIR as an ensemble root
      --device         Compute device (e.g., 'cuda:0' or 'cpu', defaults to 'cuda:0')
";

#[derive(Debug)]
struct Args {
    run_dir: String,
    dataset: String,
    mode: String,
    data_dir: String,
    ensemble: bool,
    device: String,
}

impl Args {
    fn parse() -> anyhow::Result<Option<Self>> {
        let mut pargs = Arguments::from_env();

        // Help has a higher priority and should be handled separately.
        if pargs.contains(["-h", "--help"]) {
            return Ok(None);
        }

        let args = Args {
            mode: pargs
                .opt_value_from_str(["-m", "--mode"])?
                .unwrap_or_else(|| "test".to_string()),
            data_dir: pargs
                .opt_value_from_str(["-d", "--data-dir"])?
                .unwrap_or_else(|| "data".to_string()),
            ensemble: pargs.contains("--ensemble"),
            device: pargs
                .opt_value_from_str("--device")?
                .unwrap_or_else(|| "cuda:0".to_string()),
            run_dir: pargs.free_from_str().map_err(|e| match e {
                pico_args::Error::MissingArgument => anyhow!("Missing required argument: RUN_DIR"),
                _ => anyhow!("{}", e),
            })?,
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

fn accuracy(preds: &BTreeMap<String, usize>, gold: &BTreeMap<String, i64>) -> f32 {
    let mut hits = 0usize;
    let mut total = 0usize;

    for (id, pred) in preds {
        if let Some(label) = gold.get(id) {
            total += 1;

            if *pred as i64 == *label {
                hits += 1;
            }
        }
    }

    if total > 0 {
        hits as f32 / total as f32
    } else {
        0.0
    }
}

type B = LibTorch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let output = Args::parse()?;

    if output.is_none() {
        print!("{}", HELP);

        return Ok(());
    }
    let args = output.unwrap();

    let device = parse_device(&args.device)?;

    let splits = datasets::load(&args.data_dir, &args.dataset).await?;
    let gold: BTreeMap<String, i64> = splits
        .mode_data(&args.mode)?
        .into_iter()
        .map(|item| (item.id, item.label))
        .collect();

    if args.ensemble {
        let mut ensemble: Ensemble<B> = Ensemble::open(&args.run_dir, device)?;

        let seed_labels = ensemble
            .seed_predicted_labels(&args.dataset, &args.mode)
            .await?;
        for (name, labels) in ensemble.seed_names().iter().zip(&seed_labels) {
            println!("{}: acc {:.4}", name, accuracy(labels, &gold));
        }

        let preds = ensemble
            .probs(&args.dataset, &args.mode)
            .await?
            .predicted_labels();
        println!("ensemble: acc {:.4}", accuracy(&preds, &gold));
    } else {
        let mut run: RunHandle<B> = RunHandle::open(args.run_dir.as_str(), device)?;

        let preds = run.predicted_labels(&args.dataset, &args.mode).await?;
        println!("{}: acc {:.4}", args.run_dir, accuracy(&preds, &gold));
    }

    Ok(())
}
