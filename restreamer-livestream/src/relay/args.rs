// Transcoder argument construction
//
// Pure: same inputs, same argument vector. Nothing here touches a process.

use restreamer_core::{DestinationDefinition, Quality};

/// Build the transcoder command line for one destination.
///
/// Order is fixed: input and copy/container flags, then the quality preset,
/// then the destination options (sorted by key), then the destination URL.
#[must_use]
pub fn build_transcoder_args(
    source_url: &str,
    quality: Option<Quality>,
    destination: &DestinationDefinition,
) -> Vec<String> {
    let mut args: Vec<String> = ["-i", source_url, "-c", "copy", "-f", "flv"]
        .iter()
        .map(ToString::to_string)
        .collect();

    args.extend(quality_args(quality).iter().map(ToString::to_string));

    for (key, value) in &destination.options {
        args.push(option_flag(key));
        args.push(value.clone());
    }

    args.push(destination.url.clone());
    args
}

fn quality_args(quality: Option<Quality>) -> &'static [&'static str] {
    match quality {
        Some(Quality::Worst) => &["-b:v", "500k"],
        Some(Quality::P720) => &["-s", "1280x720", "-b:v", "2000k"],
        Some(Quality::P480) => &["-s", "854x480", "-b:v", "1000k"],
        Some(Quality::Best) | None => &[],
    }
}

fn option_flag(key: &str) -> String {
    if key.starts_with('-') {
        key.to_string()
    } else {
        format!("-{key}")
    }
}
