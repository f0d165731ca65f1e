//! Command-line front end: compute the similarity table of the spaces in a
//! registry, or generate listening-test examples from their neighbours.

use std::path::PathBuf;

use clap::Parser as _;
use eyre::WrapErr as _;
use log::info;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use nnsim::builder::{AnalysisBuilder, DEFAULT_CUTOFFS};
use nnsim::distance::DistanceMetric;
use nnsim::loader::ItemIdMap;
use nnsim::metrics::SimilarityMetric;
use nnsim::sampling::{generate_examples, write_examples, ReferenceStrategy};

#[derive(clap::Parser)]
#[command(name = "nnsim")]
#[command(about = "Nearest-neighbour similarity between embedding spaces")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Compute NN-similarity at multiple cutoffs for every pair of spaces
    Analyze {
        /// Directory containing the embedding files
        input_dir: PathBuf,

        /// Registry CSV with NAME,FILE columns
        list_file: PathBuf,

        /// Output similarity table (.csv, or .json with --json)
        output_file: PathBuf,

        /// Cutoffs (number of neighbours compared)
        #[arg(long, num_args = 1.., default_values_t = DEFAULT_CUTOFFS.to_vec())]
        at: Vec<usize>,

        /// Distance used to find neighbours (minkowski[:p], euclidean, manhattan, cosine)
        #[arg(long, default_value = "minkowski")]
        distance: DistanceMetric,

        /// Similarity metrics (intersect, rbo[:p], spearman)
        #[arg(long, num_args = 1.., default_value = "intersect")]
        metric: Vec<SimilarityMetric>,

        /// File with row indices that subset every space
        #[arg(long)]
        indices_file: Option<PathBuf>,

        /// Directory for cached neighbour tables
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Write JSON instead of CSV
        #[arg(long)]
        json: bool,
    },

    /// Generate example data for a listening experiment
    Examples {
        /// Directory containing the embedding files
        input_dir: PathBuf,

        /// Registry CSV with NAME,FILE columns
        list_file: PathBuf,

        /// Output JSON file
        output_file: PathBuf,

        /// File with external ids of the (subset) rows, ascending
        #[arg(long)]
        ids_file: PathBuf,

        /// File with row indices that subset every space
        #[arg(long)]
        indices_file: Option<PathBuf>,

        /// Number of neighbours per space
        #[arg(long, default_value_t = 4)]
        at: usize,

        /// Number of reference items
        #[arg(short, default_value_t = 4)]
        n: usize,

        /// How to pick reference items (random, custom, dissimilar)
        #[arg(long, default_value = "random")]
        strategy: String,

        /// Seed for the random strategy
        #[arg(long)]
        seed: Option<u64>,

        /// Reference ids for the custom strategy, exactly -n of them
        #[arg(long, num_args = 1..)]
        custom_ids: Option<Vec<i64>>,

        /// Distance used to find neighbours
        #[arg(long, default_value = "cosine")]
        distance: DistanceMetric,
    },
}

fn main() -> eyre::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Args::parse().command {
        Command::Analyze {
            input_dir,
            list_file,
            output_file,
            at,
            distance,
            metric,
            indices_file,
            cache_dir,
            json,
        } => {
            let mut builder = AnalysisBuilder::new()
                .with_cutoffs(&at)
                .with_distance(distance)
                .with_metrics(&metric);
            if let Some(path) = indices_file {
                builder = builder.with_indices_file(path);
            }
            if let Some(dir) = cache_dir {
                builder = builder.with_cache_dir(dir);
            }

            let table = builder
                .run(&list_file, &input_dir)
                .wrap_err("similarity analysis failed")?;
            if json {
                table.write_json(&output_file)?;
            } else {
                table.write_csv(&output_file)?;
            }
        }
        Command::Examples {
            input_dir,
            list_file,
            output_file,
            ids_file,
            indices_file,
            at,
            n,
            strategy,
            seed,
            custom_ids,
            distance,
        } => {
            // reject the strategy before any neighbour search
            let strategy = ReferenceStrategy::from_parts(&strategy, n, custom_ids)?;
            let ids = ItemIdMap::from_file(&ids_file)?;

            let mut builder = AnalysisBuilder::new()
                .with_cutoffs(&[at])
                .with_distance(distance);
            if let Some(path) = indices_file {
                builder = builder.with_indices_file(path);
            }
            let spaces = builder.load(&list_file, &input_dir)?;
            let tables = builder.neighbors(&spaces)?;

            let mut rng = match seed {
                Some(s) => ChaCha8Rng::seed_from_u64(s),
                None => ChaCha8Rng::from_rng(&mut rand::rng()),
            };
            let examples = generate_examples(&tables, &ids, &strategy, at, &mut rng)
                .wrap_err("example generation failed")?;
            write_examples(&output_file, &examples)?;
            info!("Done");
        }
    }

    Ok(())
}
