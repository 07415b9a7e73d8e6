use crate::pairing::CorrespondenceTable;
use anyhow::Result;
use dialoguer::{Confirm, theme::ColorfulTheme};
use std::path::Path;

/// Numbered `Video / Audio` listing of base names.
pub fn render_table(table: &CorrespondenceTable) -> String {
    let rows: Vec<(String, String, String)> = table
        .iter()
        .enumerate()
        .map(|(num, pair)| {
            (
                (num + 1).to_string(),
                file_name(&pair.video_path),
                file_name(&pair.audio_path),
            )
        })
        .collect();

    let w_num = rows.iter().map(|r| r.0.len()).max().unwrap_or(0).max(1);
    let w_video = rows.iter().map(|r| r.1.chars().count()).max().unwrap_or(0).max(5);

    let mut out = format!("{:>w_num$}  {:<w_video$}  Audio\n", "#", "Video");
    for (num, video, audio) in &rows {
        out.push_str(&format!("{num:>w_num$}  {video:<w_video$}  {audio}\n"));
    }
    out
}

pub fn show_table(table: &CorrespondenceTable, results_dir: &Path) {
    print!("{}", render_table(table));
    println!("Result directory: {}", results_dir.display());
}

pub fn confirm() -> Result<bool> {
    let theme = ColorfulTheme::default();
    let answer = Confirm::with_theme(&theme)
        .with_prompt("Continue?")
        .interact()?;
    Ok(answer)
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairing::Pairer;
    use crate::pairing::tests::FakeProbe;
    use crate::probe::MediaKind;
    use std::fs::File;
    use tempfile::TempDir;

    #[test]
    fn test_render_table_lists_pairs_in_order() {
        let v = TempDir::new().unwrap();
        let a = TempDir::new().unwrap();
        File::create(v.path().join("episode-02.mkv")).unwrap();
        File::create(v.path().join("episode-01.mkv")).unwrap();
        File::create(a.path().join("ru-01.mka")).unwrap();
        File::create(a.path().join("ru-02.mka")).unwrap();
        let probe = FakeProbe::default()
            .with("episode-01.mkv", MediaKind::Video, 1)
            .with("episode-02.mkv", MediaKind::Video, 1)
            .with("ru-01.mka", MediaKind::Audio, 1)
            .with("ru-02.mka", MediaKind::Audio, 1);
        let table = Pairer::new(&probe)
            .build(v.path(), a.path(), v.path(), None)
            .unwrap();

        let rendered = render_table(&table);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "#  Video           Audio");
        assert_eq!(lines[1], "1  episode-01.mkv  ru-01.mka");
        assert_eq!(lines[2], "2  episode-02.mkv  ru-02.mka");
    }
}
