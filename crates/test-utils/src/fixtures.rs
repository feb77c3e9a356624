//! Common test fixtures for calibration tests.
//!
//! This module provides pre-defined parameter sets and parameter files that
//! represent common calibration scenarios.

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

/// Parameter sets for each calibration method.
pub mod parameters {
    /// Zero-adjusted gamma with `P0 = 0.5` everywhere and a moderately
    /// skewed gamma distribution for wet amounts.
    pub const ZAGA_HALF_DRY: [f32; 8] = [0.5, 0.3, -0.5, 0.0, 0.0, 0.0, 0.0, 0.0];

    /// Zero-adjusted gamma where `P0` falls with the ensemble mean and rises
    /// with the dry fraction.
    pub const ZAGA_TYPICAL: [f32; 8] = [0.8, 0.2, -0.3, 0.01, -1.0, -0.2, 1.5, -0.1];

    /// Quantile table mapping forecast `[0, 10]` onto observed `[0, 10]`.
    pub const QQ_IDENTITY: [f32; 4] = [0.0, 0.0, 10.0, 10.0];

    /// Quantile table with obs `[0, 5, 30]` and fcst `[0, 10, 20]`.
    pub const QQ_THREE_POINT: [f32; 6] = [0.0, 0.0, 5.0, 10.0, 30.0, 20.0];

    /// Zero-order regression: every output is 0.3.
    pub const REGRESSION_CONSTANT: [f32; 1] = [0.3];

    /// First-order regression: `0.5 + 0.9 * raw`.
    pub const REGRESSION_LINEAR: [f32; 2] = [0.5, 0.9];
}

/// Parameter file contents in the text format.
pub mod parameter_files {
    /// Zero-order regression for three lead times.
    pub const REGRESSION_BY_TIME: &str = "\
# time p0
0 0.3
1 0.4
2 0.5
";

    /// Single-time zero-adjusted gamma table, valid for every lead time.
    pub const ZAGA_SINGLE_TIME: &str = "\
# time mua mub sa sb a b c d
0 0.5 0.3 -0.5 0.0 0.0 0.0 0.0 0.0
";

    /// Two-site zero-order regression, western and eastern halves of the
    /// test geometry.
    pub const REGRESSION_TWO_SITES: &str = "\
# time lat lon elev p0
0 58.5 5.0 100 1.0
0 58.5 6.0 300 2.0
";

    /// Phase thresholds `snow_sleet sleet_rain` in Kelvin, every lead time.
    pub const PHASE_THRESHOLDS: &str = "\
# time snow_sleet sleet_rain
0 273.7 274.7
";

    /// Odd number of quantile-table values: rejected by quantile mapping.
    pub const QQ_ODD_COUNT: &str = "0 0.0 0.0 10.0\n";
}

/// A parameter file written to a temporary directory.
///
/// The directory is removed when the fixture is dropped.
pub struct ParameterFileFixture {
    dir: TempDir,
    path: PathBuf,
}

impl ParameterFileFixture {
    /// Write `contents` to `name` inside a fresh temporary directory.
    pub fn new(name: &str, contents: &str) -> std::io::Result<Self> {
        let dir = TempDir::new()?;
        let path = dir.path().join(name);
        fs::write(&path, contents)?;
        Ok(Self { dir, path })
    }

    /// Full path of the written file.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Directory holding the file; other files can be written next to it.
    pub fn dir(&self) -> &std::path::Path {
        self.dir.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_file_fixture_writes_contents() {
        let fixture = ParameterFileFixture::new("regression.txt", parameter_files::REGRESSION_BY_TIME)
            .unwrap();
        let read = fs::read_to_string(fixture.path()).unwrap();
        assert_eq!(read, parameter_files::REGRESSION_BY_TIME);
        assert!(fixture.path().starts_with(fixture.dir()));
    }

    #[test]
    fn test_fixture_directory_is_removed_on_drop() {
        let fixture = ParameterFileFixture::new("p.txt", "0 1.0\n").unwrap();
        let dir = fixture.dir().to_path_buf();
        assert!(dir.exists());
        drop(fixture);
        assert!(!dir.exists(), "temporary directory should be cleaned up");
    }

    #[test]
    fn test_parameter_file_texts_have_one_row_per_time() {
        let rows: Vec<&str> = parameter_files::REGRESSION_BY_TIME
            .lines()
            .filter(|line| !line.starts_with('#'))
            .collect();
        assert_eq!(rows, ["0 0.3", "1 0.4", "2 0.5"]);
    }
}
