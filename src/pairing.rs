//! Matching video files to companion audio files.
//!
//! Both directories are listed, filtered by probed media kind, sorted by
//! path and zipped position for position. The resulting table is the batch
//! order and is never revalidated against later filesystem changes.

use crate::probe::{MediaKind, MediaProbe, ProbeError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrespondencePair {
    pub video_path: PathBuf,
    pub audio_path: PathBuf,
    pub result_path: PathBuf,
}

impl CorrespondencePair {
    /// The result keeps the video's file name inside `results_dir`.
    pub fn new(video_path: PathBuf, audio_path: PathBuf, results_dir: &Path) -> Self {
        let result_path = match video_path.file_name() {
            Some(name) => results_dir.join(name),
            None => results_dir.to_path_buf(),
        };
        Self {
            video_path,
            audio_path,
            result_path,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrespondenceTable {
    pairs: Vec<CorrespondencePair>,
}

impl CorrespondenceTable {
    pub fn pairs(&self) -> &[CorrespondencePair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CorrespondencePair> {
        self.pairs().iter()
    }
}

impl<'a> IntoIterator for &'a CorrespondenceTable {
    type Item = &'a CorrespondencePair;
    type IntoIter = std::slice::Iter<'a, CorrespondencePair>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurationMismatch {
    pub video_path: PathBuf,
    pub video_duration: Duration,
    pub audio_path: PathBuf,
    pub audio_duration: Duration,
}

impl fmt::Display for DurationMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}s) and {} ({}s)",
            self.video_path.display(),
            self.video_duration.as_secs(),
            self.audio_path.display(),
            self.audio_duration.as_secs()
        )
    }
}

#[derive(Debug, Error)]
pub enum PairingError {
    #[error(
        "Not equal number of videos and audios: {video_count} videos and {audio_count} audios"
    )]
    UnequalCount {
        video_count: usize,
        audio_count: usize,
    },

    #[error(
        "Durations differ by more than {}s:\n{}",
        .tolerance.as_secs(),
        list_mismatches(.mismatches)
    )]
    DurationMismatch {
        tolerance: Duration,
        mismatches: Vec<DurationMismatch>,
    },

    #[error("cannot read directory {}: {source}", .path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Probe(#[from] ProbeError),
}

fn list_mismatches(mismatches: &[DurationMismatch]) -> String {
    mismatches
        .iter()
        .map(|m| format!("  {m}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct Pairer<'a> {
    probe: &'a dyn MediaProbe,
}

impl<'a> Pairer<'a> {
    pub fn new(probe: &'a dyn MediaProbe) -> Self {
        Self { probe }
    }

    /// Builds the table. `tolerance` of `None` skips the duration check.
    pub fn build(
        &self,
        video_dir: &Path,
        audio_dir: &Path,
        results_dir: &Path,
        tolerance: Option<Duration>,
    ) -> Result<CorrespondenceTable, PairingError> {
        let videos = self.find(video_dir, MediaKind::Video)?;
        let audios = self.find(audio_dir, MediaKind::Audio)?;
        tracing::debug!(videos = videos.len(), audios = audios.len(), "scanned directories");

        if videos.len() != audios.len() {
            return Err(PairingError::UnequalCount {
                video_count: videos.len(),
                audio_count: audios.len(),
            });
        }

        let pairs = videos
            .into_iter()
            .zip(audios)
            .map(|(video, audio)| CorrespondencePair::new(video, audio, results_dir))
            .collect();
        let table = CorrespondenceTable { pairs };

        if let Some(tolerance) = tolerance {
            self.check_durations(&table, tolerance)?;
        }
        Ok(table)
    }

    fn find(&self, dir: &Path, kind: MediaKind) -> Result<Vec<PathBuf>, PairingError> {
        let read_err = |source| PairingError::ReadDir {
            path: dir.to_path_buf(),
            source,
        };

        let mut found = Vec::new();
        for entry in fs::read_dir(dir).map_err(read_err)? {
            let path = entry.map_err(read_err)?.path();
            if !path.is_file() {
                continue;
            }
            if self.probe.classify(&path)? == kind {
                found.push(path);
            }
        }
        found.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));
        Ok(found)
    }

    /// Probes every pair and reports all offenders at once.
    fn check_durations(
        &self,
        table: &CorrespondenceTable,
        tolerance: Duration,
    ) -> Result<(), PairingError> {
        let mut mismatches = Vec::new();
        for pair in table {
            let video_duration = self.probe.duration(&pair.video_path)?;
            let audio_duration = self.probe.duration(&pair.audio_path)?;
            if video_duration.abs_diff(audio_duration) > tolerance {
                mismatches.push(DurationMismatch {
                    video_path: pair.video_path.clone(),
                    video_duration,
                    audio_path: pair.audio_path.clone(),
                    audio_duration,
                });
            }
        }

        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(PairingError::DurationMismatch {
                tolerance,
                mismatches,
            })
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs::File;
    use tempfile::TempDir;

    /// Probe answering from a table keyed by file name.
    #[derive(Default)]
    pub(crate) struct FakeProbe {
        pub(crate) media: HashMap<String, (MediaKind, u64)>,
    }

    impl FakeProbe {
        pub(crate) fn with(mut self, name: &str, kind: MediaKind, secs: u64) -> Self {
            self.media.insert(name.to_string(), (kind, secs));
            self
        }

        fn lookup(&self, path: &Path) -> (MediaKind, u64) {
            let name = path.file_name().unwrap().to_string_lossy();
            self.media
                .get(&*name)
                .copied()
                .unwrap_or((MediaKind::Unknown, 0))
        }
    }

    impl MediaProbe for FakeProbe {
        fn duration(&self, path: &Path) -> Result<Duration, ProbeError> {
            Ok(Duration::from_secs(self.lookup(path).1))
        }

        fn classify(&self, path: &Path) -> Result<MediaKind, ProbeError> {
            Ok(self.lookup(path).0)
        }
    }

    struct Dirs {
        video: TempDir,
        audio: TempDir,
        results: TempDir,
    }

    fn dirs(videos: &[&str], audios: &[&str]) -> Dirs {
        let d = Dirs {
            video: TempDir::new().unwrap(),
            audio: TempDir::new().unwrap(),
            results: TempDir::new().unwrap(),
        };
        for name in videos {
            File::create(d.video.path().join(name)).unwrap();
        }
        for name in audios {
            File::create(d.audio.path().join(name)).unwrap();
        }
        d
    }

    fn build(
        d: &Dirs,
        probe: &FakeProbe,
        tolerance: Option<u64>,
    ) -> Result<CorrespondenceTable, PairingError> {
        Pairer::new(probe).build(
            d.video.path(),
            d.audio.path(),
            d.results.path(),
            tolerance.map(Duration::from_secs),
        )
    }

    #[test]
    fn test_pairs_sorted_and_zipped() {
        let d = dirs(&["b.mkv", "a.mkv", "c.mkv"], &["3.mka", "1.mka", "2.mka"]);
        let probe = FakeProbe::default()
            .with("a.mkv", MediaKind::Video, 10)
            .with("b.mkv", MediaKind::Video, 10)
            .with("c.mkv", MediaKind::Video, 10)
            .with("1.mka", MediaKind::Audio, 10)
            .with("2.mka", MediaKind::Audio, 10)
            .with("3.mka", MediaKind::Audio, 10);

        let table = build(&d, &probe, None).unwrap();
        let names: Vec<(String, String)> = table
            .iter()
            .map(|p| {
                (
                    p.video_path.file_name().unwrap().to_string_lossy().into_owned(),
                    p.audio_path.file_name().unwrap().to_string_lossy().into_owned(),
                )
            })
            .collect();
        assert_eq!(
            names,
            vec![
                ("a.mkv".to_string(), "1.mka".to_string()),
                ("b.mkv".to_string(), "2.mka".to_string()),
                ("c.mkv".to_string(), "3.mka".to_string()),
            ]
        );
        assert_eq!(table.pairs()[1].result_path, d.results.path().join("b.mkv"));
    }

    #[test]
    fn test_classification_filters_each_side() {
        // Only audio-classified files count on the audio side, whatever
        // their extension says.
        let d = dirs(&["a.mkv", "notes.txt", "music.mp3"], &["a.mka", "cover.mkv"]);
        let probe = FakeProbe::default()
            .with("a.mkv", MediaKind::Video, 5)
            .with("music.mp3", MediaKind::Audio, 5)
            .with("a.mka", MediaKind::Audio, 5)
            .with("cover.mkv", MediaKind::Video, 5);

        let table = build(&d, &probe, Some(0)).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.pairs()[0].video_path, d.video.path().join("a.mkv"));
        assert_eq!(table.pairs()[0].audio_path, d.audio.path().join("a.mka"));
    }

    #[test]
    fn test_unequal_counts_fail_with_both_counts() {
        let d = dirs(&["a.mkv", "b.mkv"], &["a.mka"]);
        let probe = FakeProbe::default()
            .with("a.mkv", MediaKind::Video, 1)
            .with("b.mkv", MediaKind::Video, 1)
            .with("a.mka", MediaKind::Audio, 1);

        let err = build(&d, &probe, None).unwrap_err();
        assert!(matches!(
            err,
            PairingError::UnequalCount {
                video_count: 2,
                audio_count: 1
            }
        ));
        assert!(err.to_string().contains("2 videos and 1 audios"));
    }

    #[test]
    fn test_equal_durations_pass_exact_check() {
        let d = dirs(&["a.mkv"], &["a.mka"]);
        let probe = FakeProbe::default()
            .with("a.mkv", MediaKind::Video, 10)
            .with("a.mka", MediaKind::Audio, 10);
        assert!(build(&d, &probe, Some(0)).is_ok());
    }

    #[test]
    fn test_duration_mismatch_names_paths_and_durations() {
        let d = dirs(&["a.mkv"], &["a.mka"]);
        let probe = FakeProbe::default()
            .with("a.mkv", MediaKind::Video, 10)
            .with("a.mka", MediaKind::Audio, 12);

        let err = build(&d, &probe, Some(0)).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains(&d.video.path().join("a.mkv").display().to_string()));
        assert!(msg.contains(&d.audio.path().join("a.mka").display().to_string()));
        assert!(msg.contains("(10s)"));
        assert!(msg.contains("(12s)"));

        assert!(build(&d, &probe, Some(3)).is_ok());
        assert!(build(&d, &probe, None).is_ok());
    }

    #[test]
    fn test_duration_mismatches_are_aggregated() {
        let d = dirs(&["a.mkv", "b.mkv", "c.mkv"], &["a.mka", "b.mka", "c.mka"]);
        let probe = FakeProbe::default()
            .with("a.mkv", MediaKind::Video, 10)
            .with("b.mkv", MediaKind::Video, 20)
            .with("c.mkv", MediaKind::Video, 30)
            .with("a.mka", MediaKind::Audio, 15)
            .with("b.mka", MediaKind::Audio, 20)
            .with("c.mka", MediaKind::Audio, 25);

        match build(&d, &probe, Some(1)).unwrap_err() {
            PairingError::DurationMismatch { mismatches, .. } => {
                assert_eq!(mismatches.len(), 2);
                assert_eq!(mismatches[0].video_duration, Duration::from_secs(10));
                assert_eq!(mismatches[0].audio_duration, Duration::from_secs(15));
                assert_eq!(mismatches[1].video_duration, Duration::from_secs(30));
            }
            other => panic!("expected duration mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_directory_is_read_error() {
        let probe = FakeProbe::default();
        let tmp = TempDir::new().unwrap();
        let err = Pairer::new(&probe)
            .build(&tmp.path().join("gone"), tmp.path(), tmp.path(), None)
            .unwrap_err();
        assert!(matches!(err, PairingError::ReadDir { .. }));
    }

    #[test]
    fn test_empty_directories_give_empty_table() {
        let d = dirs(&[], &[]);
        let table = build(&d, &FakeProbe::default(), Some(0)).unwrap();
        assert!(table.is_empty());
    }
}
