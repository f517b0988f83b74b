use crate::config::{ConfigCommand, ExtractionSettings, StatusMessage, ThreadCommunication};
use crate::data_container::{ExtractionOutcome, FftResults, FrequencyRoi, Waveforms};
use crate::error::{ExtractionError, ExtractionResult};
use crate::extraction::{current_fft_results, run_extraction};
use crate::io::{load_measurement, save_fft_data, save_material_parameters, save_thickness_curve};
use crate::signal::SignalConditioner;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::{Arc, RwLock};
use std::time::Instant;

fn publish<T>(lock: &Arc<RwLock<Option<T>>>, value: Option<T>) {
    if let Ok(mut write_guard) = lock.write() {
        *write_guard = value;
    }
}

fn read<T: Clone>(lock: &Arc<RwLock<Option<T>>>) -> Option<T> {
    lock.read().ok().and_then(|guard| guard.clone())
}

/// State owned by the processing thread.
struct Processor {
    conditioner: SignalConditioner,
    /// `None` means the full frequency axis.
    roi: Option<FrequencyRoi>,
    settings: ExtractionSettings,
}

impl Processor {
    /// Drops every derived result and publishes the spectra of the current data.
    fn refresh(&self, thread_communication: &ThreadCommunication) -> ExtractionResult<StatusMessage> {
        publish(&thread_communication.extraction_lock, None);
        publish(&thread_communication.fft_lock, None);
        let fft = current_fft_results(&self.conditioner)?;
        let bins = fft.freq.len();
        publish(&thread_communication.fft_lock, Some(fft));
        Ok(StatusMessage::DataReady {
            samples: self.kept_samples(),
            bins,
        })
    }

    fn kept_samples(&self) -> usize {
        self.conditioner
            .truncation()
            .map(|state| state.kept())
            .unwrap_or(0)
    }

    fn set_waveforms(
        &mut self,
        waveforms: Waveforms,
        thread_communication: &ThreadCommunication,
    ) -> ExtractionResult<StatusMessage> {
        self.conditioner
            .set_data(waveforms.time, waveforms.reference, waveforms.sample)?;
        self.roi = None;
        self.refresh(thread_communication)
    }

    fn extract(&self, thread_communication: &ThreadCommunication) -> ExtractionResult<StatusMessage> {
        let start = Instant::now();
        publish(&thread_communication.progress_lock, Some(0));
        let progress_lock = thread_communication.progress_lock.clone();
        let status_tx = thread_communication.status_tx.clone();
        let result = run_extraction(
            &self.conditioner,
            self.roi,
            &self.settings,
            move |percent| {
                if let Ok(mut p) = progress_lock.write() {
                    *p = Some(percent);
                }
                status_tx.send(StatusMessage::Progress(percent)).ok();
            },
            &thread_communication.abort_flag,
        );
        publish(&thread_communication.progress_lock, None);

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(ExtractionError::Cancelled) => {
                // ready for the next run
                thread_communication
                    .abort_flag
                    .store(false, Ordering::Relaxed);
                return Err(ExtractionError::Cancelled);
            }
            Err(err) => return Err(err),
        };
        log::info!(
            "{} extraction of {} bins at {:.2} µm took {:?}",
            outcome.method,
            outcome.spectrum.len(),
            outcome.spectrum.thickness_um,
            start.elapsed()
        );
        publish(&thread_communication.extraction_lock, Some(outcome));
        Ok(StatusMessage::ExtractionDone)
    }
}

fn require<T>(value: Option<T>, what: &str) -> ExtractionResult<T> {
    value.ok_or_else(|| ExtractionError::DataValidation(format!("no {what} available to save")))
}

fn saved(path: &Path) -> StatusMessage {
    StatusMessage::Saved(path.to_path_buf())
}

/// Processing loop. Owns the signal conditioner and executes the commands received on
/// `config_rx` in order until `Quit` arrives or every sender is dropped.
pub fn main_thread(thread_communication: ThreadCommunication) {
    let mut processor = Processor {
        conditioner: SignalConditioner::new(),
        roi: None,
        settings: thread_communication.settings.clone(),
    };

    while let Ok(config_command) = thread_communication.config_rx.recv() {
        let result: ExtractionResult<StatusMessage> = match config_command {
            ConfigCommand::OpenFiles { reference, sample } => {
                load_measurement(&reference, &sample).and_then(|waveforms| {
                    processor.set_waveforms(waveforms, &thread_communication)
                })
            }
            ConfigCommand::SetData(waveforms) => {
                processor.set_waveforms(waveforms, &thread_communication)
            }
            ConfigCommand::SetTruncation(cutoff) => processor
                .conditioner
                .update_truncation(cutoff)
                .and_then(|_| processor.refresh(&thread_communication)),
            ConfigCommand::SetFrequencyRoi([f_min, f_max]) => {
                FrequencyRoi::new(f_min, f_max).map(|roi| {
                    processor.roi = Some(roi);
                    publish::<ExtractionOutcome>(&thread_communication.extraction_lock, None);
                    let frequencies = processor.conditioner.frequencies().to_vec();
                    StatusMessage::DataReady {
                        samples: processor.kept_samples(),
                        bins: roi.indices(&frequencies).len(),
                    }
                })
            }
            ConfigCommand::SetSettings(settings) => settings.validate().map(|_| {
                processor.settings = settings;
                publish::<ExtractionOutcome>(&thread_communication.extraction_lock, None);
                StatusMessage::DataReady {
                    samples: processor.kept_samples(),
                    bins: processor.conditioner.frequencies().len(),
                }
            }),
            ConfigCommand::Extract => processor.extract(&thread_communication),
            ConfigCommand::SaveFftData(path) => {
                require::<FftResults>(read(&thread_communication.fft_lock), "FFT data")
                    .and_then(|fft| save_fft_data(&path, &fft))
                    .map(|_| saved(&path))
            }
            ConfigCommand::SaveMaterialParameters(path) => {
                require(read(&thread_communication.extraction_lock), "extracted data")
                    .and_then(|outcome| save_material_parameters(&path, &outcome))
                    .map(|_| saved(&path))
            }
            ConfigCommand::SaveThicknessCurve(path) => require(
                read(&thread_communication.extraction_lock).and_then(|outcome| outcome.search),
                "thickness optimization",
            )
            .and_then(|search| save_thickness_curve(&path, &search))
            .map(|_| saved(&path)),
            ConfigCommand::Quit => {
                break;
            }
        };

        let status = match result {
            Ok(status) => status,
            Err(err) => {
                log::error!("{err}");
                StatusMessage::Failed(err.to_string())
            }
        };
        if thread_communication.status_tx.send(status).is_err() {
            log::warn!("status receiver dropped");
        }
    }

    log::debug!("processing thread stopped");
    thread_communication.status_tx.send(StatusMessage::Stopped).ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionMethod;
    use ndarray::Array1;
    use std::thread;

    fn waveforms() -> Waveforms {
        let time = Array1::from_shape_fn(256, |i| i as f64 * 0.05);
        let pulse = |center: f64| time.mapv(|t| (-0.5 * ((t - center) / 0.2).powi(2)).exp());
        Waveforms {
            reference: pulse(4.0),
            sample: pulse(4.5) * 0.7,
            time,
        }
    }

    fn run(commands: Vec<ConfigCommand>) -> (ThreadCommunication, Vec<StatusMessage>) {
        let thread_communication = ThreadCommunication::new(ExtractionSettings::default());
        let worker = thread_communication.clone();
        let handle = thread::spawn(move || main_thread(worker));
        for command in commands {
            thread_communication.send(command);
        }
        thread_communication.send(ConfigCommand::Quit);
        handle.join().unwrap();
        let messages = thread_communication.status_rx.try_iter().collect();
        (thread_communication, messages)
    }

    #[test]
    fn test_extraction_is_published() {
        let (thread_communication, messages) = run(vec![
            ConfigCommand::SetData(waveforms()),
            ConfigCommand::SetFrequencyRoi([0.2, 1.5]),
            ConfigCommand::Extract,
        ]);
        assert_eq!(
            messages[0],
            StatusMessage::DataReady {
                samples: 256,
                bins: 128
            }
        );
        assert_eq!(messages[2], StatusMessage::ExtractionDone);
        assert_eq!(messages.last(), Some(&StatusMessage::Stopped));

        let outcome = read(&thread_communication.extraction_lock).unwrap();
        assert_eq!(outcome.method, ExtractionMethod::Analytical);
        assert!(outcome.spectrum.frequencies.iter().all(|&f| (0.2..=1.5).contains(&f)));
        assert!(read(&thread_communication.fft_lock).is_some());
        assert_eq!(read(&thread_communication.progress_lock), None);
    }

    #[test]
    fn test_truncation_clears_results() {
        let (thread_communication, messages) = run(vec![
            ConfigCommand::SetData(waveforms()),
            ConfigCommand::SetFrequencyRoi([0.2, 1.5]),
            ConfigCommand::Extract,
            ConfigCommand::SetTruncation(9.01),
        ]);
        assert_eq!(messages[2], StatusMessage::ExtractionDone);
        match &messages[3] {
            StatusMessage::DataReady { samples, .. } => assert_eq!(*samples, 181),
            other => panic!("unexpected message {other:?}"),
        }
        assert!(read(&thread_communication.extraction_lock).is_none());
        assert_eq!(read(&thread_communication.fft_lock).unwrap().freq.len(), 90);
    }

    #[test]
    fn test_failures_are_reported() {
        let (_, messages) = run(vec![
            ConfigCommand::Extract,
            ConfigCommand::SaveMaterialParameters(std::env::temp_dir().join("never_written.csv")),
            ConfigCommand::SetFrequencyRoi([2.0, 1.0]),
        ]);
        assert_eq!(messages.len(), 4);
        assert!(messages[..3]
            .iter()
            .all(|m| matches!(m, StatusMessage::Failed(_))));
    }
}
