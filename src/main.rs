//! Command-line front end.
//!
//! ```sh
//! thz-material-extractor fft -r ref.txt -s sam.txt
//! thz-material-extractor extract -r ref.txt -s sam.txt --thickness 512 --f-min 0.2 --f-max 1.5
//! thz-material-extractor extract -r ref.txt -s sam.txt --method numerical --tv-output tv.csv
//! ```

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use preferences::{AppInfo, Preferences};
use std::path::PathBuf;
use std::thread;
use thz_material_extractor::config::{
    ConfigCommand, ExtractionMethod, ExtractionSettings, NonConvergencePolicy, StatusMessage,
    ThreadCommunication,
};
use thz_material_extractor::data_thread::main_thread;
use thz_material_extractor::io::{
    default_fft_file_name, default_material_file_name, default_thickness_curve_file_name,
    save_material_parameters, save_thickness_curve, today,
};

const APP_INFO: AppInfo = AppInfo {
    name: "THz Material Extractor",
    author: "Linus Leo Stöckli",
};

const PREFS_KEY: &str = "config/extraction";

#[derive(Parser)]
#[command(name = "thz-material-extractor")]
#[command(about = "Optical material parameters from THz time-domain measurements")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct MeasurementArgs {
    /// Reference waveform (time in ps, amplitude in V).
    #[arg(short, long)]
    reference: PathBuf,
    /// Sample waveform, same time axis as the reference.
    #[arg(short, long)]
    sample: PathBuf,
    /// Discard samples after this time (ps).
    #[arg(short, long)]
    truncate: Option<f64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum MethodArg {
    Analytical,
    Numerical,
}

/// `abort` is not offered: the numerical method always runs a thickness sweep, and a sweep
/// never fails on a single non-converged bin.
#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Ignore,
    Warn,
}

#[derive(Subcommand)]
enum Commands {
    /// Export reference and sample spectra with the unwrapped phase.
    Fft {
        #[command(flatten)]
        measurement: MeasurementArgs,
        /// Output file, `fft_data_<date>.csv` in the output directory if omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Extract n, κ and α.
    Extract {
        #[command(flatten)]
        measurement: MeasurementArgs,
        /// Lower edge of the frequency band (THz).
        #[arg(long, requires = "f_max")]
        f_min: Option<f64>,
        /// Upper edge of the frequency band (THz).
        #[arg(long, requires = "f_min")]
        f_max: Option<f64>,
        #[arg(short, long, value_enum)]
        method: Option<MethodArg>,
        /// Sample thickness (µm), the sweep center for the numerical method.
        #[arg(short = 'd', long)]
        thickness: Option<f64>,
        #[arg(long)]
        n_guess: Option<f64>,
        #[arg(long)]
        kappa_guess: Option<f64>,
        /// Half width of the per-bin search box.
        #[arg(long)]
        tolerance: Option<f64>,
        /// Thickness sweep step (µm).
        #[arg(long)]
        step: Option<f64>,
        /// Thickness sweep half width (µm).
        #[arg(long)]
        span: Option<f64>,
        /// Handling of bins where the simplex search did not converge.
        #[arg(long, value_enum)]
        non_convergence: Option<PolicyArg>,
        /// Evaluate thickness candidates one after another.
        #[arg(long)]
        sequential: bool,
        /// Material parameter file, named after method, thickness and band if omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Thickness curve file (numerical method only).
        #[arg(long)]
        tv_output: Option<PathBuf>,
        /// Store the resulting settings as the new defaults.
        #[arg(long)]
        remember: bool,
    },
    /// Print the stored default settings.
    Settings,
}

fn load_settings() -> ExtractionSettings {
    match ExtractionSettings::load(&APP_INFO, PREFS_KEY) {
        Ok(settings) => settings,
        Err(_) => {
            let settings = ExtractionSettings::default();
            // save default settings
            if let Err(err) = settings.save(&APP_INFO, PREFS_KEY) {
                log::error!("error in saving settings: {err:?}");
            }
            settings
        }
    }
}

fn measurement_commands(measurement: MeasurementArgs) -> Vec<ConfigCommand> {
    let mut commands = vec![ConfigCommand::OpenFiles {
        reference: measurement.reference,
        sample: measurement.sample,
    }];
    if let Some(cutoff) = measurement.truncate {
        commands.push(ConfigCommand::SetTruncation(cutoff));
    }
    commands
}

/// Runs `commands` on a processing thread and waits until all of them are done.
///
/// # Returns
/// The shared state of the stopped thread, or the first failure it reported.
fn run_session(
    settings: ExtractionSettings,
    commands: Vec<ConfigCommand>,
) -> anyhow::Result<ThreadCommunication> {
    let thread_communication = ThreadCommunication::new(settings);
    let worker = thread_communication.clone();
    let handle = thread::spawn(move || main_thread(worker));
    for command in commands {
        thread_communication.send(command);
    }
    thread_communication.send(ConfigCommand::Quit);

    let mut failure = None;
    for status in thread_communication.status_rx.iter() {
        match status {
            StatusMessage::DataReady { samples, bins } => {
                log::info!("{samples} samples, {bins} frequency bins");
            }
            StatusMessage::Progress(percent) => log::info!("thickness sweep {percent}%"),
            StatusMessage::ExtractionDone => log::debug!("extraction done"),
            StatusMessage::Saved(path) => println!("saved {}", path.display()),
            StatusMessage::Failed(message) => {
                failure.get_or_insert(message);
            }
            StatusMessage::Stopped => break,
        }
    }
    handle
        .join()
        .map_err(|_| anyhow!("processing thread panicked"))?;
    if let Some(message) = failure {
        bail!(message);
    }
    Ok(thread_communication)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let mut settings = load_settings();

    match cli.command {
        Commands::Fft {
            measurement,
            output,
        } => {
            let path = output
                .unwrap_or_else(|| settings.output_directory.join(default_fft_file_name(today())));
            let mut commands = measurement_commands(measurement);
            commands.push(ConfigCommand::SaveFftData(path));
            run_session(settings, commands)?;
            Ok(())
        }
        Commands::Extract {
            measurement,
            f_min,
            f_max,
            method,
            thickness,
            n_guess,
            kappa_guess,
            tolerance,
            step,
            span,
            non_convergence,
            sequential,
            output,
            tv_output,
            remember,
        } => {
            if let Some(method) = method {
                settings.method = match method {
                    MethodArg::Analytical => ExtractionMethod::Analytical,
                    MethodArg::Numerical => ExtractionMethod::Numerical,
                };
            }
            if let Some(policy) = non_convergence {
                settings.non_convergence = match policy {
                    PolicyArg::Ignore => NonConvergencePolicy::Ignore,
                    PolicyArg::Warn => NonConvergencePolicy::Warn,
                };
            }
            settings.thickness_um = thickness.unwrap_or(settings.thickness_um);
            settings.n_guess = n_guess.unwrap_or(settings.n_guess);
            settings.kappa_guess = kappa_guess.unwrap_or(settings.kappa_guess);
            settings.tolerance = tolerance.unwrap_or(settings.tolerance);
            settings.thickness_step_um = step.unwrap_or(settings.thickness_step_um);
            settings.thickness_span_um = span.unwrap_or(settings.thickness_span_um);
            if sequential {
                settings.parallel_sweep = false;
            }
            settings.validate().context("invalid settings")?;

            if remember {
                settings
                    .save(&APP_INFO, PREFS_KEY)
                    .map_err(|err| anyhow!("failed to store settings: {err:?}"))?;
            }

            let mut commands = measurement_commands(measurement);
            if let (Some(f_min), Some(f_max)) = (f_min, f_max) {
                commands.push(ConfigCommand::SetFrequencyRoi([f_min, f_max]));
            }
            commands.push(ConfigCommand::SetSettings(settings.clone()));
            commands.push(ConfigCommand::Extract);
            let thread_communication = run_session(settings.clone(), commands)?;

            let outcome = thread_communication
                .extraction_lock
                .read()
                .map_err(|_| anyhow!("extraction result is not readable"))?
                .clone()
                .context("no extraction result")?;

            let spectrum = &outcome.spectrum;
            println!(
                "{} extraction: {} bins, {:.2} - {:.2} THz, d = {:.2} µm",
                outcome.method,
                spectrum.len(),
                outcome.roi.f_min,
                outcome.roi.f_max,
                spectrum.thickness_um
            );
            if !spectrum.non_converged_bins.is_empty() {
                println!(
                    "{} bins did not converge: {:?}",
                    spectrum.non_converged_bins.len(),
                    spectrum.non_converged_bins
                );
            }

            let path = output.unwrap_or_else(|| {
                settings
                    .output_directory
                    .join(default_material_file_name(&outcome, today()))
            });
            save_material_parameters(&path, &outcome)
                .with_context(|| format!("failed to save {}", path.display()))?;
            println!("saved {}", path.display());

            if let Some(search) = &outcome.search {
                let path = tv_output.unwrap_or_else(|| {
                    settings
                        .output_directory
                        .join(default_thickness_curve_file_name(today()))
                });
                save_thickness_curve(&path, search)
                    .with_context(|| format!("failed to save {}", path.display()))?;
                println!("saved {}", path.display());
            }
            Ok(())
        }
        Commands::Settings => {
            println!("{settings:#?}");
            Ok(())
        }
    }
}
