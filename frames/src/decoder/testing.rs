use figure_judge_common::config::DecoderConfig;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Stand-in ffprobe/ffmpeg scripts in `dir`.
///
/// ffprobe reports a `width`x`height` stream at 10 fps with 3 frames; ffmpeg
/// runs `ffmpeg_body` as a shell snippet, so it controls what lands on stdout
/// and the exit status.
pub(crate) fn fake_tools(dir: &Path, width: u32, height: u32, ffmpeg_body: &str) -> DecoderConfig {
    let probe = format!(
        r#"cat <<'EOF'
{{"streams": [{{"width": {width}, "height": {height}, "avg_frame_rate": "10/1", "r_frame_rate": "10/1", "nb_frames": "3"}}]}}
EOF"#
    );
    DecoderConfig {
        ffprobe_path: script(dir, "ffprobe", &probe),
        ffmpeg_path: script(dir, "ffmpeg", ffmpeg_body),
        ..DecoderConfig::default()
    }
}

fn script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}
