// ========================================================================================
//
//                         THE BATCH ORCHESTRATOR: MANIFEST
//
// ========================================================================================
//
// Loads a declarative scoring model, runs one passenger table through the
// preprocessing and evaluation pipeline, and writes the submission table.
//
// ### Startup Contract ###
//
// 1.  **Permissive model load:** a model that fails to load is reported and
//     replaced by an empty handle. Prediction is still attempted and then
//     fails with a diagnostic naming the model path.
//
// 2.  **All or nothing output:** the submission file is written only when
//     every row was predicted. Any failure leaves the destination untouched
//     and exits with status 1.

#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{CommandFactory, Parser, Subcommand};
use manifest::config::PreprocessConfig;
use manifest::io::write_submission;
use manifest::model::ModelHandle;
use manifest::pipeline::{Pipeline, RowDefectPolicy};
use manifest::preprocess::Preprocessor;
use std::path::PathBuf;
use std::process;
use std::time::Instant;

// ========================================================================================
//                         COMMAND-LINE INTERFACE DEFINITION
// ========================================================================================

#[derive(Parser)]
#[command(
    name = "manifest",
    version,
    about = "Batch survival scoring of passenger manifests against a regression model."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict survival for every row of a test table
    #[command(about = "Score a test table (outputs: submission.csv)")]
    Predict {
        /// Path to the comma-separated test table
        #[arg(value_name = "TEST_DATA", default_value = "test.csv")]
        test_data: PathBuf,

        /// Path to the model document (.toml)
        #[arg(long)]
        model: PathBuf,

        /// Where to write the submission table
        #[arg(long, default_value = "submission.csv")]
        output: PathBuf,

        /// Optional preprocessing constants (.toml)
        #[arg(long, value_name = "TOML")]
        config: Option<PathBuf>,

        /// What to do with rows that fall outside every bin or category
        #[arg(long, value_enum, default_value_t = RowDefectPolicy::Abort)]
        on_row_defect: RowDefectPolicy,
    },

    /// Print the input schema a model expects
    #[command(about = "Show a model's ordered input fields and target")]
    Schema {
        /// Path to the model document (.toml)
        #[arg(long)]
        model: PathBuf,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();
    let result = match command {
        Some(Commands::Predict {
            test_data,
            model,
            output,
            config,
            on_row_defect,
        }) => run_predict(test_data, model, output, config, on_row_defect),
        Some(Commands::Schema { model }) => run_schema(model),
        None => {
            let mut command = Cli::command();
            command
                .print_help()
                .map(|()| println!())
                .map_err(|e| e.to_string())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

// ========================================================================================
//                                   SUBCOMMANDS
// ========================================================================================

fn run_predict(
    test_data: PathBuf,
    model: PathBuf,
    output: PathBuf,
    config: Option<PathBuf>,
    policy: RowDefectPolicy,
) -> Result<(), String> {
    let start_time = Instant::now();

    let config = match config {
        Some(path) => {
            eprintln!("> Using preprocessing config: {}", path.display());
            PreprocessConfig::load(&path).map_err(|e| e.to_string())?
        }
        None => PreprocessConfig::default(),
    };

    // --- Phase 1: Model Load (permissive) ---
    let handle = ModelHandle::open(&model);
    if handle.is_loaded() {
        eprintln!("> Model loaded from: {}", model.display());
    } else {
        eprintln!("> Failed to load model: {}", model.display());
    }

    // --- Phase 2: Prediction ---
    let pipeline = Pipeline::new(Preprocessor::new(config), policy);
    let prediction = match pipeline.predict(&handle, &test_data) {
        Ok(table) => Some(table),
        Err(e) => {
            eprintln!("Prediction failed: {e}");
            None
        }
    };

    // --- Phase 3: Output ---
    write_submission(prediction.as_ref(), &output).map_err(|e| e.to_string())?;
    println!("File {} successfully saved", output.display());
    eprintln!("> Finished in {:.2?}", start_time.elapsed());
    Ok(())
}

fn run_schema(model: PathBuf) -> Result<(), String> {
    let handle = ModelHandle::load(&model).map_err(|e| e.to_string())?;
    println!("Model: {}", handle.source().display());
    for (position, (name, data_type)) in handle.input_schema().into_iter().enumerate() {
        println!("  {:>2}  {name:<12} {data_type:?}", position + 1);
    }
    if let Some(target) = handle.target_name() {
        println!("Target: {target}");
    }
    Ok(())
}
