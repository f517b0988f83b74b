//! Reading waveform files and writing the result tables.

use crate::data_container::{ExtractionOutcome, FftResults, ThicknessSearchResult, Waveforms};
use crate::error::{ExtractionError, ExtractionResult};
use chrono::{Local, NaiveDate};
use ndarray::Array1;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Reads a two-column waveform file.
///
/// Columns are separated by whitespace: time in ps, amplitude in V. Further columns are ignored,
/// blank lines and lines starting with `#` are skipped.
///
/// # Returns
/// The time axis and the amplitude.
pub fn load_waveform(path: &Path) -> ExtractionResult<(Array1<f64>, Array1<f64>)> {
    let file = File::open(path)?;
    let mut time = vec![];
    let mut amplitude = vec![];

    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let parse_error = |reason: String| ExtractionError::Parse {
            path: path.to_path_buf(),
            line: i + 1,
            reason,
        };
        let mut columns = trimmed.split_whitespace();
        let (Some(t), Some(a)) = (columns.next(), columns.next()) else {
            return Err(parse_error("expected two columns".to_string()));
        };
        time.push(
            t.parse::<f64>()
                .map_err(|err| parse_error(format!("time {t:?}: {err}")))?,
        );
        amplitude.push(
            a.parse::<f64>()
                .map_err(|err| parse_error(format!("amplitude {a:?}: {err}")))?,
        );
    }

    if time.is_empty() {
        return Err(ExtractionError::DataValidation(format!(
            "{} contains no samples",
            path.display()
        )));
    }
    log::debug!("read {} samples from {}", time.len(), path.display());
    Ok((Array1::from_vec(time), Array1::from_vec(amplitude)))
}

/// Reads a reference and a sample file into one waveform pair.
///
/// The time axis of the reference is used for both traces; the two files must have the same
/// number of samples.
pub fn load_measurement(reference_path: &Path, sample_path: &Path) -> ExtractionResult<Waveforms> {
    let (time, reference) = load_waveform(reference_path)?;
    let (_, sample) = load_waveform(sample_path)?;
    if reference.len() != sample.len() {
        return Err(ExtractionError::DataValidation(format!(
            "reference has {} samples but sample has {}",
            reference.len(),
            sample.len()
        )));
    }
    log::info!(
        "loaded reference {} and sample {}",
        reference_path.display(),
        sample_path.display()
    );
    Ok(Waveforms {
        time,
        reference,
        sample,
    })
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// `fft_data_<date>.csv`
pub fn default_fft_file_name(date: NaiveDate) -> String {
    format!("fft_data_{}.csv", date.format("%Y-%m-%d"))
}

/// `material_params_<Method>_d<thickness>um_<fmin>-<fmax>THz_<date>.csv`
pub fn default_material_file_name(outcome: &ExtractionOutcome, date: NaiveDate) -> String {
    format!(
        "material_params_{}_d{}um_{:.2}-{:.2}THz_{}.csv",
        outcome.method,
        outcome.spectrum.thickness_um.trunc() as i64,
        outcome.roi.f_min,
        outcome.roi.f_max,
        date.format("%Y-%m-%d")
    )
}

/// `thickness_curve_<date>.csv`
pub fn default_thickness_curve_file_name(date: NaiveDate) -> String {
    format!("thickness_curve_{}.csv", date.format("%Y-%m-%d"))
}

pub fn write_fft_data<W: Write>(
    writer: &mut W,
    results: &FftResults,
    timestamp: &str,
) -> std::io::Result<()> {
    writeln!(writer, "FFT Data from THz-TDS")?;
    writeln!(writer, "Timestamp: {timestamp}")?;
    writeln!(writer)?;
    writeln!(writer, "f (THz)\t|FFT_r|\t|FFT_s|\tPhi")?;
    for i in 0..results.freq.len() {
        writeln!(
            writer,
            "{:.4}\t{:.4}\t{:.4}\t{:.4}",
            results.freq[i], results.fft_ref[i], results.fft_sam[i], results.phi_unwrapped[i]
        )?;
    }
    Ok(())
}

pub fn write_material_parameters<W: Write>(
    writer: &mut W,
    outcome: &ExtractionOutcome,
    timestamp: &str,
) -> std::io::Result<()> {
    let spectrum = &outcome.spectrum;
    writeln!(writer, "Material Parameters Extracted from THz-TDS")?;
    writeln!(writer, "Timestamp: {timestamp}")?;
    writeln!(writer, "Extraction Method: {}", outcome.method)?;
    writeln!(writer, "Sample Thickness: {:.1} µm", spectrum.thickness_um)?;
    writeln!(
        writer,
        "Frequency Range: {:.2} – {:.2} THz",
        outcome.roi.f_min, outcome.roi.f_max
    )?;
    writeln!(writer)?;
    writeln!(writer, "f (THz)\tn\tkappa\talpha")?;
    for i in 0..spectrum.len() {
        writeln!(
            writer,
            "{:.4}\t{:.4}\t{:.4}\t{:.4}",
            spectrum.frequencies[i], spectrum.n[i], spectrum.kappa[i], spectrum.alpha[i]
        )?;
    }
    Ok(())
}

pub fn write_thickness_curve<W: Write>(
    writer: &mut W,
    search: &ThicknessSearchResult,
    timestamp: &str,
) -> std::io::Result<()> {
    writeln!(writer, "Thickness Optimization from THz-TDS")?;
    writeln!(writer, "Timestamp: {timestamp}")?;
    writeln!(writer, "Best Thickness: {:.2} µm", search.best_thickness_um())?;
    writeln!(writer)?;
    writeln!(writer, "d (um)\tTV\tTV_norm")?;
    for i in 0..search.thicknesses_um.len() {
        writeln!(
            writer,
            "{:.4}\t{:.4}\t{:.4}",
            search.thicknesses_um[i], search.total_variation[i], search.normalized_tv[i]
        )?;
    }
    Ok(())
}

fn save_with<F>(path: &Path, write: F) -> ExtractionResult<()>
where
    F: FnOnce(&mut BufWriter<File>, &str) -> std::io::Result<()>,
{
    let mut writer = BufWriter::new(File::create(path)?);
    write(&mut writer, &timestamp())?;
    writer.flush()?;
    log::info!("saved {}", path.display());
    Ok(())
}

/// Writes the spectra and the unwrapped phase, one row per bin.
pub fn save_fft_data(path: &Path, results: &FftResults) -> ExtractionResult<()> {
    save_with(path, |w, ts| write_fft_data(w, results, ts))
}

/// Writes n, κ and α of an extraction run, one row per bin.
pub fn save_material_parameters(path: &Path, outcome: &ExtractionOutcome) -> ExtractionResult<()> {
    save_with(path, |w, ts| write_material_parameters(w, outcome, ts))
}

/// Writes the total variation of every thickness candidate.
pub fn save_thickness_curve(path: &Path, search: &ThicknessSearchResult) -> ExtractionResult<()> {
    save_with(path, |w, ts| write_thickness_curve(w, search, ts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionMethod;
    use crate::data_container::{FrequencyRoi, MaterialSpectrum};
    use std::path::PathBuf;

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "thz_material_extractor_{}_{name}",
            std::process::id()
        ));
        std::fs::write(&path, content).unwrap();
        path
    }

    fn outcome() -> ExtractionOutcome {
        ExtractionOutcome {
            method: ExtractionMethod::Numerical,
            spectrum: MaterialSpectrum {
                frequencies: vec![0.25, 0.5],
                n: vec![1.95, 1.951],
                kappa: vec![0.0051, 0.00512],
                alpha: vec![0.534, 1.07],
                thickness_um: 512.75,
                non_converged_bins: vec![],
            },
            roi: FrequencyRoi::new(0.2, 1.5).unwrap(),
            search: None,
        }
    }

    #[test]
    fn test_load_waveform_skips_comments() {
        let path = temp_file(
            "ref.txt",
            "# time (ps)  amplitude (V)\n0.0 0.1\n\n0.05\t0.2\n  0.10   -0.3  7\n",
        );
        let (time, amplitude) = load_waveform(&path).unwrap();
        assert_eq!(time.to_vec(), vec![0.0, 0.05, 0.1]);
        assert_eq!(amplitude.to_vec(), vec![0.1, 0.2, -0.3]);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_load_waveform_reports_bad_line() {
        let path = temp_file("bad.txt", "0.0 0.1\n0.05 abc\n");
        match load_waveform(&path) {
            Err(ExtractionError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result {other:?}"),
        }
        std::fs::remove_file(&path).unwrap();

        let path = temp_file("short.txt", "0.0 0.1\n0.05\n");
        assert!(matches!(
            load_waveform(&path),
            Err(ExtractionError::Parse { line: 2, .. })
        ));
        std::fs::remove_file(&path).unwrap();

        let path = temp_file("empty.txt", "# nothing\n");
        assert!(matches!(
            load_waveform(&path),
            Err(ExtractionError::DataValidation(_))
        ));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_measurement_checks_lengths() {
        let reference = temp_file("m_ref.txt", "0 1\n1 2\n2 3\n");
        let sample = temp_file("m_sam.txt", "0 4\n1 5\n2 6\n");
        let short = temp_file("m_short.txt", "0 4\n1 5\n");

        let waveforms = load_measurement(&reference, &sample).unwrap();
        assert_eq!(waveforms.time.to_vec(), vec![0.0, 1.0, 2.0]);
        assert_eq!(waveforms.sample.to_vec(), vec![4.0, 5.0, 6.0]);
        assert!(matches!(
            load_measurement(&reference, &short),
            Err(ExtractionError::DataValidation(_))
        ));
        assert!(matches!(
            load_measurement(&reference, Path::new("/nonexistent/sample.txt")),
            Err(ExtractionError::Io(_))
        ));
        for path in [reference, sample, short] {
            std::fs::remove_file(path).unwrap();
        }
    }

    #[test]
    fn test_fft_data_layout() {
        let results = FftResults {
            freq: vec![0.0, 0.039],
            fft_ref: vec![12.5, 3.25],
            fft_sam: vec![10.0, 2.0],
            phi_unwrapped: vec![0.0, 0.12345],
        };
        let mut buffer = vec![];
        write_fft_data(&mut buffer, &results, "2024-05-01T12:00:00").unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "FFT Data from THz-TDS");
        assert_eq!(lines[1], "Timestamp: 2024-05-01T12:00:00");
        assert_eq!(lines[2], "");
        assert_eq!(lines[3], "f (THz)\t|FFT_r|\t|FFT_s|\tPhi");
        assert_eq!(lines[4], "0.0000\t12.5000\t10.0000\t0.0000");
        assert_eq!(lines[5], "0.0390\t3.2500\t2.0000\t0.1235");
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn test_material_parameter_layout() {
        let mut buffer = vec![];
        write_material_parameters(&mut buffer, &outcome(), "now").unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Material Parameters Extracted from THz-TDS");
        assert_eq!(lines[2], "Extraction Method: Numerical");
        assert_eq!(lines[3], "Sample Thickness: 512.8 µm");
        assert_eq!(lines[4], "Frequency Range: 0.20 – 1.50 THz");
        assert_eq!(lines[5], "");
        assert_eq!(lines[6], "f (THz)\tn\tkappa\talpha");
        assert_eq!(lines[7], "0.2500\t1.9500\t0.0051\t0.5340");
        assert_eq!(lines.len(), 9);
    }

    #[test]
    fn test_thickness_curve_layout() {
        let search = ThicknessSearchResult {
            thicknesses_um: vec![495.0, 500.0],
            total_variation: vec![0.5, 0.25],
            normalized_tv: vec![1.0, 0.5],
            best_index: 1,
            best: MaterialSpectrum {
                thickness_um: 500.0,
                ..MaterialSpectrum::default()
            },
        };
        let mut buffer = vec![];
        write_thickness_curve(&mut buffer, &search, "now").unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[2], "Best Thickness: 500.00 µm");
        assert_eq!(lines[4], "d (um)\tTV\tTV_norm");
        assert_eq!(lines[5], "495.0000\t0.5000\t1.0000");
        assert_eq!(lines[6], "500.0000\t0.2500\t0.5000");
    }

    #[test]
    fn test_default_file_names() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(default_fft_file_name(date), "fft_data_2024-05-01.csv");
        assert_eq!(
            default_material_file_name(&outcome(), date),
            "material_params_Numerical_d512um_0.20-1.50THz_2024-05-01.csv"
        );
    }

    #[test]
    fn test_save_material_parameters_to_file() {
        let path = std::env::temp_dir().join(format!(
            "thz_material_extractor_{}_params.csv",
            std::process::id()
        ));
        save_material_parameters(&path, &outcome()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Material Parameters Extracted from THz-TDS\nTimestamp: "));
        assert!(text.ends_with("0.5000\t1.9510\t0.0051\t1.0700\n"));
        std::fs::remove_file(path).unwrap();
    }
}
