use crate::{
    error::RemuxError,
    logger::{Logger, debug, info, warning},
    utils,
};
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
};
use tokio::{fs, process::Command};

/// Repackages a raw ADTS stream into an .m4a container with ffmpeg (stream copy).
#[derive(Debug, Clone)]
pub struct Remuxer {
    ffmpeg: PathBuf,
    logger: Logger,
}

impl Remuxer {
    /// Uses `ffmpeg` when given, otherwise looks it up on `PATH`.
    pub fn new(ffmpeg: Option<PathBuf>, logger: Logger) -> Result<Self, RemuxError> {
        let ffmpeg = ffmpeg
            .or_else(utils::find_ffmpeg)
            .ok_or(RemuxError::FfmpegNotFound)?;

        Ok(Self { ffmpeg, logger })
    }

    pub fn ffmpeg(&self) -> &Path {
        &self.ffmpeg
    }

    /// Writes `raw` to a transient file next to `output` and remuxes it.
    ///
    /// The transient file is always removed. On failure `output` is removed too.
    pub async fn remux(&self, raw: &[u8], output: &Path) -> Result<(), RemuxError> {
        let output_guard = PartialOutput::new(output);

        if let Some(parent) = output.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let temp_file = TransientFile::new(transient_path(output));
        debug!(
            self.logger,
            "Writing {} bytes to {}",
            raw.len(),
            temp_file.path.display()
        );
        fs::write(&temp_file.path, raw).await?;

        let args = ffmpeg_args(&temp_file.path, output);

        info!(
            self.logger,
            "Executing {} {}",
            self.ffmpeg.display(),
            args.iter()
                .map(|x| x.to_string_lossy())
                .map(|x| if x.contains(' ') {
                    format!("\"{x}\"")
                } else {
                    x.into_owned()
                })
                .collect::<Vec<_>>()
                .join(" ")
        );

        let result = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|x| RemuxError::RemuxFailed {
                output: output.to_owned(),
                status: "not started".to_owned(),
                stderr: x.to_string(),
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_owned();
            warning!(self.logger, "ffmpeg exited with {}", result.status);

            return Err(RemuxError::RemuxFailed {
                output: output.to_owned(),
                status: result.status.to_string(),
                stderr: utils::truncate_body(stderr),
            });
        }

        output_guard.commit();
        info!(self.logger, "Saved {}", output.display());
        Ok(())
    }
}

fn ffmpeg_args(input: &Path, output: &Path) -> Vec<OsString> {
    let mut args = ["-y", "-hide_banner", "-loglevel", "error", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect::<Vec<_>>();

    args.push(input.as_os_str().to_owned());
    args.extend(
        [
            "-c:a",
            "copy",
            "-f",
            "ipod",
            "-brand",
            "M4A ",
            "-movflags",
            "+faststart",
        ]
        .into_iter()
        .map(OsString::from),
    );
    args.push(output.as_os_str().to_owned());
    args
}

/// `<output>.temp.aac`
pub(crate) fn transient_path(output: &Path) -> PathBuf {
    let mut path = output.as_os_str().to_owned();
    path.push(".temp.aac");
    PathBuf::from(path)
}

/// Removes its file when dropped.
pub(crate) struct TransientFile {
    pub(crate) path: PathBuf,
}

impl TransientFile {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Drop for TransientFile {
    fn drop(&mut self) {
        remove_if_exists(&self.path);
    }
}

/// Removes the output file when dropped, unless committed.
/// Keeps a failed or cancelled pipeline from leaving a truncated file behind.
pub(crate) struct PartialOutput {
    path: Option<PathBuf>,
}

impl PartialOutput {
    pub(crate) fn new(path: &Path) -> Self {
        Self {
            path: Some(path.to_owned()),
        }
    }

    pub(crate) fn commit(mut self) {
        self.path = None;
    }
}

impl Drop for PartialOutput {
    fn drop(&mut self) {
        if let Some(path) = &self.path {
            remove_if_exists(path);
        }
    }
}

fn remove_if_exists(path: &Path) {
    // Errors cannot be reported from a destructor.
    let _ = std::fs::remove_file(path);
}
