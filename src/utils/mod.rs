use anyhow::Result;
use url::Url;

use crate::PipelineError;

/// Validate a URL and require an HTTP(S) scheme
pub fn validate_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url)
        .map_err(|_| anyhow::anyhow!("Invalid URL format: {}", url))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("URL must use HTTP or HTTPS protocol");
    }

    Ok(parsed)
}

/// Extract the video id from the `v` query parameter of a watch URL
pub fn extract_video_id(url: &str) -> std::result::Result<String, PipelineError> {
    let parsed = Url::parse(url.trim())
        .map_err(|_| PipelineError::MalformedInput(format!("not a URL: {}", url)))?;

    parsed
        .query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            PipelineError::MalformedInput(format!("missing `v` query parameter: {}", url))
        })
}

/// Format duration in human-readable format
pub fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}
