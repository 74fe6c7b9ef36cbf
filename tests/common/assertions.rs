//! Custom test assertions

use std::path::Path;

/// Assert that a file holds exactly `expected`, reporting the first mismatch
pub fn assert_file_bytes(path: &Path, expected: &[u8]) {
    let actual = std::fs::read(path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));

    assert_eq!(
        actual.len(),
        expected.len(),
        "Length mismatch for {}",
        path.display()
    );

    if let Some(at) = actual.iter().zip(expected).position(|(a, e)| a != e) {
        panic!(
            "Content mismatch for {} at offset {}: got {:#04x}, expected {:#04x}",
            path.display(),
            at,
            actual[at],
            expected[at]
        );
    }
}

/// Assert that a file does not exist
pub fn assert_file_absent(path: &Path) {
    assert!(
        !path.exists(),
        "Expected {} to be removed",
        path.display()
    );
}

/// Assert that a file exists
pub fn assert_file_exists(path: &Path) {
    assert!(path.exists(), "Expected {} to exist", path.display());
}

/// Assert that `reports` grows strictly and that no two consecutive values
/// are closer than `interval`
pub fn assert_progress_spacing(reports: &[u64], interval: u64) {
    for pair in reports.windows(2) {
        assert!(
            pair[1] > pair[0],
            "Progress went backwards: {:?}",
            reports
        );
        assert!(
            pair[1] - pair[0] >= interval,
            "Progress reported more often than every {} bytes: {:?}",
            interval,
            reports
        );
    }
}
