use crate::error::{ConvertError, ConvertResult};
use crate::extractor::{ByteStream, MediaExtractor};
use crate::types::{ConvertOptions, StreamFormat, StreamSelection, TargetFormat, VideoMetadata};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, warn};

/// Longest sanitized title used in a download filename
pub const MAX_FILENAME_CHARS: usize = 50;

const FALLBACK_FILENAME: &str = "download";
const CHUNK_SIZE: usize = 64 * 1024;
/// Chunks buffered between the transcoder and the response body
const CHANNEL_CAPACITY: usize = 8;
const STDERR_TAIL_BYTES: usize = 2048;
const FRAGMENTED_MP4_FLAGS: &str = "frag_keyframe+empty_moov+default_base_moof";

/// How a selection is turned into output bytes
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionPlan {
    /// Source bytes are forwarded unchanged
    Passthrough { source: StreamFormat },
    /// ffmpeg is run with these arguments and its stdout is the output
    Transcode { args: Vec<String> },
}

/// Converted output ready to be written to an HTTP response
pub struct ConversionOutput {
    pub content_type: &'static str,
    pub filename: String,
    pub content_disposition: String,
    pub stream: ConversionStream,
}

/// Streaming conversion pipeline driving ffmpeg
#[derive(Debug, Clone)]
pub struct ConversionPipeline {
    ffmpeg_path: String,
    audio_bitrate_kbps: u32,
}

impl ConversionPipeline {
    pub fn new(options: &ConvertOptions) -> Self {
        Self {
            ffmpeg_path: options.ffmpeg_path.clone(),
            audio_bitrate_kbps: options.audio_bitrate_kbps,
        }
    }

    pub fn plan(
        &self,
        selection: &StreamSelection,
        target: TargetFormat,
    ) -> ConvertResult<ConversionPlan> {
        if let (TargetFormat::Mp4, StreamSelection::Combined { source }) = (target, selection)
            && source.is_mp4_compatible()
        {
            return Ok(ConversionPlan::Passthrough {
                source: source.clone(),
            });
        }

        Ok(ConversionPlan::Transcode {
            args: self.ffmpeg_args(selection, target)?,
        })
    }

    /// Build the ffmpeg command line; output always goes to stdout
    pub fn ffmpeg_args(
        &self,
        selection: &StreamSelection,
        target: TargetFormat,
    ) -> ConvertResult<Vec<String>> {
        let mut args = strings(&["-hide_banner", "-loglevel", "error", "-nostdin"]);
        let audio_bitrate = format!("{}k", self.audio_bitrate_kbps);

        match target {
            TargetFormat::Mp3 => {
                let audio = match selection {
                    StreamSelection::AudioOnly { audio } => audio,
                    StreamSelection::Combined { source } => source,
                    StreamSelection::Separate { audio, .. } => audio,
                };
                push_input(&mut args, audio);
                args.extend(strings(&["-vn", "-c:a", "libmp3lame", "-b:a"]));
                args.push(audio_bitrate);
                args.extend(strings(&["-f", "mp3", "pipe:1"]));
            }
            TargetFormat::Mp4 => {
                let (video, audio, audio_input) = match selection {
                    StreamSelection::Separate { video, audio } => {
                        push_input(&mut args, video);
                        push_input(&mut args, audio);
                        (video, audio, "1:a:0")
                    }
                    StreamSelection::Combined { source } => {
                        push_input(&mut args, source);
                        (source, source, "0:a:0")
                    }
                    StreamSelection::AudioOnly { .. } => {
                        return Err(ConvertError::NoSuitableStream {
                            format: target.to_string(),
                        });
                    }
                };

                args.extend(strings(&["-map", "0:v:0", "-map", audio_input]));
                if video.is_h264() {
                    args.extend(strings(&["-c:v", "copy"]));
                } else {
                    args.extend(strings(&["-c:v", "libx264", "-preset", "veryfast"]));
                }
                if audio.is_aac() {
                    args.extend(strings(&["-c:a", "copy"]));
                } else {
                    args.extend(strings(&["-c:a", "aac", "-b:a"]));
                    args.push(audio_bitrate);
                }
                args.extend(strings(&["-movflags", FRAGMENTED_MP4_FLAGS, "-f", "mp4", "pipe:1"]));
            }
        }

        Ok(args)
    }

    /// Start converting and wait for the first output chunk.
    ///
    /// Errors that happen before any byte is produced are returned here so the
    /// caller can still answer with a proper error status. Later failures end
    /// the stream with an error item.
    pub async fn start(
        &self,
        extractor: &dyn MediaExtractor,
        selection: &StreamSelection,
        metadata: &VideoMetadata,
        target: TargetFormat,
    ) -> ConvertResult<ConversionOutput> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let (pump, transcoder_pid) = match self.plan(selection, target)? {
            ConversionPlan::Passthrough { source } => {
                info!("Passing through {} stream {}", source.ext, source.format_id);
                let upstream = extractor.open_stream(&source).await?;
                (tokio::spawn(pump_upstream(upstream, tx)), None)
            }
            ConversionPlan::Transcode { args } => {
                info!(
                    "Transcoding {} source to {} with {}",
                    selection.kind(),
                    target,
                    self.ffmpeg_path
                );
                debug!("ffmpeg args: {:?}", args);

                let child = Command::new(&self.ffmpeg_path)
                    .args(&args)
                    .stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .kill_on_drop(true)
                    .spawn()
                    .map_err(|e| ConvertError::ConversionFailed {
                        message: format!("failed to start {}: {}", self.ffmpeg_path, e),
                    })?;
                let pid = child.id();
                (tokio::spawn(pump_transcoder(child, tx)), pid)
            }
        };

        let mut stream = ConversionStream {
            rx,
            first: None,
            transcoder_pid,
            _pump: AbortOnDrop(pump),
        };
        stream.prime().await?;

        let filename = output_filename(&metadata.title, target);
        Ok(ConversionOutput {
            content_type: target.content_type(),
            content_disposition: content_disposition(&filename),
            filename,
            stream,
        })
    }
}

/// Output bytes of a running conversion.
///
/// Dropping the stream stops the pump task, which kills the transcoder
/// process and closes the upstream connection.
pub struct ConversionStream {
    rx: mpsc::Receiver<ConvertResult<Bytes>>,
    first: Option<Bytes>,
    transcoder_pid: Option<u32>,
    _pump: AbortOnDrop,
}

impl ConversionStream {
    /// OS process id of the running ffmpeg, if one was spawned
    pub fn transcoder_pid(&self) -> Option<u32> {
        self.transcoder_pid
    }

    async fn prime(&mut self) -> ConvertResult<()> {
        match self.rx.recv().await {
            Some(Ok(chunk)) => {
                self.first = Some(chunk);
                Ok(())
            }
            Some(Err(e)) => Err(e),
            None => Err(ConvertError::ConversionFailed {
                message: "conversion produced no output".to_string(),
            }),
        }
    }
}

impl Stream for ConversionStream {
    type Item = ConvertResult<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(first) = self.first.take() {
            return Poll::Ready(Some(Ok(first)));
        }
        self.rx.poll_recv(cx)
    }
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn pump_upstream(mut upstream: ByteStream, tx: mpsc::Sender<ConvertResult<Bytes>>) {
    while let Some(chunk) = upstream.next().await {
        let failed = match &chunk {
            Ok(bytes) if bytes.is_empty() => continue,
            Ok(_) => false,
            Err(e) => {
                error!("Upstream read failed: {}", e);
                true
            }
        };

        if tx.send(chunk).await.is_err() {
            debug!("Output closed, dropping upstream connection");
            return;
        }
        if failed {
            return;
        }
    }
}

async fn pump_transcoder(mut child: Child, tx: mpsc::Sender<ConvertResult<Bytes>>) {
    let Some(stdout) = child.stdout.take() else {
        let _ = child.kill().await;
        let _ = tx
            .send(Err(ConvertError::ConversionFailed {
                message: "transcoder stdout unavailable".to_string(),
            }))
            .await;
        return;
    };
    let stderr_tail = child.stderr.take().map(|stderr| tokio::spawn(read_tail(stderr)));

    let mut reader = ReaderStream::with_capacity(stdout, CHUNK_SIZE);
    while let Some(chunk) = reader.next().await {
        match chunk {
            Ok(bytes) => {
                if tx.send(Ok(bytes)).await.is_err() {
                    debug!("Output closed, stopping transcoder");
                    let _ = child.kill().await;
                    return;
                }
            }
            Err(e) => {
                error!("Reading transcoder output failed: {}", e);
                let _ = child.kill().await;
                let _ = tx.send(Err(e.into())).await;
                return;
            }
        }
    }

    let status = child.wait().await;
    let stderr = match stderr_tail {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    match status {
        Ok(status) if status.success() => debug!("Transcoder finished"),
        Ok(status) => {
            error!("Transcoder exited with {}: {}", status, stderr.trim());
            let _ = tx
                .send(Err(ConvertError::ConversionFailed {
                    message: format!("ffmpeg exited with {}", status),
                }))
                .await;
        }
        Err(e) => {
            error!("Waiting for transcoder failed: {}", e);
            let _ = tx.send(Err(e.into())).await;
        }
    }
}

/// Keep the last few KiB of a pipe for diagnostics
async fn read_tail<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut buf = Vec::new();
    if let Err(e) = reader.read_to_end(&mut buf).await {
        warn!("Failed to read transcoder stderr: {}", e);
    }
    let start = buf.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&buf[start..]).into_owned()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn push_input(args: &mut Vec<String>, format: &StreamFormat) {
    if !format.http_headers.is_empty() {
        let mut headers: Vec<_> = format.http_headers.iter().collect();
        headers.sort();
        let joined: String = headers
            .into_iter()
            .map(|(key, value)| format!("{}: {}\r\n", key, value))
            .collect();
        args.push("-headers".to_string());
        args.push(joined);
    }
    args.push("-i".to_string());
    args.push(format.url.clone());
}

/// Strip everything but letters, digits and whitespace, then cap the length
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .take(MAX_FILENAME_CHARS)
        .collect();

    if cleaned.trim().is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        cleaned
    }
}

pub fn output_filename(title: &str, target: TargetFormat) -> String {
    format!("{}.{}", sanitize_title(title), target.extension())
}

/// `Content-Disposition` value with an ASCII fallback and an RFC 5987 name
pub fn content_disposition(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|c| if c.is_ascii() { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        urlencoding::encode(filename)
    )
}

/// First line of `<program> <flag>`, used to check external tools at startup
pub async fn tool_version(program: &str, flag: &str) -> ConvertResult<String> {
    let output = Command::new(program)
        .arg(flag)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        return Err(ConvertError::Configuration {
            message: format!("{} {} exited with {}", program, flag, output.status),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::YtDlpExtractor;
    use crate::test_support::{NoopExtractor, write_script};
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn pipeline(ffmpeg: &str) -> ConversionPipeline {
        ConversionPipeline::new(&ConvertOptions::new().ffmpeg_path(ffmpeg))
    }

    fn metadata(title: &str) -> VideoMetadata {
        VideoMetadata {
            title: title.to_string(),
            duration_seconds: 212,
            thumbnail_url: "https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg".to_string(),
            author: "Rick Astley".to_string(),
        }
    }

    fn source(id: &str, ext: &str, vcodec: &str, acodec: &str) -> StreamFormat {
        StreamFormat {
            format_id: id.to_string(),
            url: format!("https://rr.googlevideo.com/{}", id),
            ext: ext.to_string(),
            vcodec: Some(vcodec.to_string()),
            acodec: Some(acodec.to_string()),
            ..Default::default()
        }
    }

    fn audio_selection() -> StreamSelection {
        StreamSelection::AudioOnly {
            audio: source("251", "webm", "none", "opus"),
        }
    }

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("Hello, World!"), "Hello World");
        assert_eq!(sanitize_title("Tab\tand\nnewline"), "Tab and newline");
        assert_eq!(sanitize_title("Привет мир"), "Привет мир");
        assert_eq!(sanitize_title("!!!???"), "download");
        assert_eq!(sanitize_title(""), "download");
    }

    #[test]
    fn test_sanitize_truncates_to_fifty_chars() {
        let title = "Rick Astley - Never Gonna Give You Up (Official Music Video) [4K Remaster]";
        let sanitized = sanitize_title(title);

        assert_eq!(sanitized.chars().count(), MAX_FILENAME_CHARS);
        assert_eq!(sanitized, "Rick Astley  Never Gonna Give You Up Official Musi");
    }

    #[test]
    fn test_content_disposition() {
        let header = content_disposition(&output_filename("Ünïcode: title?", TargetFormat::Mp3));

        assert!(header.starts_with("attachment; filename=\"_n_code title.mp3\""));
        assert!(header.contains("filename*=UTF-8''%C3%9Cn%C3%AFcode%20title.mp3"));
        assert!(header.is_ascii());
    }

    #[test]
    fn test_output_filename_extension() {
        assert!(output_filename("Song", TargetFormat::Mp3).ends_with(".mp3"));
        assert!(output_filename("Clip", TargetFormat::Mp4).ends_with(".mp4"));
    }

    proptest! {
        #[test]
        fn prop_sanitized_title_is_clean(title in "\\PC{0,120}") {
            let sanitized = sanitize_title(&title);
            prop_assert!(sanitized.chars().count() <= MAX_FILENAME_CHARS);
            prop_assert!(sanitized.chars().all(|c| c.is_alphanumeric() || c == ' '));
        }

        #[test]
        fn prop_long_titles_are_exactly_fifty(title in "[a-zA-Z0-9 ,.!?'-]{60,120}") {
            let kept: Vec<char> = title
                .chars()
                .filter(|c| c.is_alphanumeric() || *c == ' ')
                .take(MAX_FILENAME_CHARS)
                .collect();
            prop_assume!(kept.len() == MAX_FILENAME_CHARS);
            prop_assume!(kept.iter().any(|c| c.is_alphanumeric()));
            prop_assert_eq!(sanitize_title(&title).chars().count(), MAX_FILENAME_CHARS);
        }
    }

    #[test]
    fn test_plan_passthrough_for_compatible_mp4() {
        let selection = StreamSelection::Combined {
            source: source("18", "mp4", "avc1.42001E", "mp4a.40.2"),
        };
        let plan = pipeline("ffmpeg").plan(&selection, TargetFormat::Mp4).unwrap();
        assert!(matches!(plan, ConversionPlan::Passthrough { .. }));

        // Same source for mp3 must be transcoded
        let plan = pipeline("ffmpeg").plan(&selection, TargetFormat::Mp3).unwrap();
        assert!(matches!(plan, ConversionPlan::Transcode { .. }));
    }

    #[test]
    fn test_mp3_args() {
        let args = pipeline("ffmpeg")
            .ffmpeg_args(&audio_selection(), TargetFormat::Mp3)
            .unwrap();

        assert!(args.windows(2).any(|w| w[0] == "-i" && w[1].ends_with("/251")));
        assert!(args.windows(2).any(|w| w[0] == "-c:a" && w[1] == "libmp3lame"));
        assert!(args.windows(2).any(|w| w[0] == "-b:a" && w[1] == "192k"));
        assert!(args.contains(&"-vn".to_string()));
        assert_eq!(args.last().unwrap(), "pipe:1");
    }

    #[test]
    fn test_mp4_separate_args() {
        let selection = StreamSelection::Separate {
            video: source("136", "mp4", "avc1.4d401f", "none"),
            audio: source("251", "webm", "none", "opus"),
        };
        let args = pipeline("ffmpeg")
            .ffmpeg_args(&selection, TargetFormat::Mp4)
            .unwrap();

        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 2);
        assert!(args.windows(2).any(|w| w[0] == "-c:v" && w[1] == "copy"));
        assert!(args.windows(2).any(|w| w[0] == "-c:a" && w[1] == "aac"));
        assert!(args.windows(2).any(|w| w[0] == "-map" && w[1] == "1:a:0"));
        assert!(args.windows(2).any(|w| w[0] == "-movflags" && w[1] == FRAGMENTED_MP4_FLAGS));
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "mp4"));
    }

    #[test]
    fn test_mp4_reencode_args() {
        let selection = StreamSelection::Combined {
            source: source("43", "webm", "vp8", "vorbis"),
        };
        let args = pipeline("ffmpeg")
            .ffmpeg_args(&selection, TargetFormat::Mp4)
            .unwrap();

        assert!(args.windows(2).any(|w| w[0] == "-c:v" && w[1] == "libx264"));
        assert!(args.windows(2).any(|w| w[0] == "-map" && w[1] == "0:a:0"));
    }

    #[test]
    fn test_mp4_from_audio_only_is_rejected() {
        let result = pipeline("ffmpeg").ffmpeg_args(&audio_selection(), TargetFormat::Mp4);
        assert!(matches!(result, Err(ConvertError::NoSuitableStream { .. })));
    }

    #[test]
    fn test_input_headers_are_forwarded() {
        let mut format = source("140", "m4a", "none", "mp4a.40.2");
        format.http_headers = HashMap::from([
            ("User-Agent".to_string(), "Mozilla/5.0".to_string()),
            ("Accept".to_string(), "*/*".to_string()),
        ]);

        let mut args = Vec::new();
        push_input(&mut args, &format);

        assert_eq!(args[0], "-headers");
        assert_eq!(args[1], "Accept: */*\r\nUser-Agent: Mozilla/5.0\r\n");
        assert_eq!(args[2], "-i");
    }

    #[tokio::test]
    async fn test_missing_transcoder_fails_before_output() {
        let result = pipeline("/nonexistent/ffmpeg")
            .start(
                &NoopExtractor,
                &audio_selection(),
                &metadata("Song"),
                TargetFormat::Mp3,
            )
            .await;

        assert!(matches!(result, Err(ConvertError::ConversionFailed { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_transcoder_without_output_fails_before_output() {
        let result = pipeline("false")
            .start(
                &NoopExtractor,
                &audio_selection(),
                &metadata("Song"),
                TargetFormat::Mp3,
            )
            .await;

        assert!(matches!(result, Err(ConvertError::ConversionFailed { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_after_first_byte_ends_stream_with_error() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "ffmpeg", "printf 'ID3partial'\nexit 3");

        let output = pipeline(script.to_str().unwrap())
            .start(
                &NoopExtractor,
                &audio_selection(),
                &metadata("Song"),
                TargetFormat::Mp3,
            )
            .await
            .unwrap();
        assert_eq!(output.content_type, "audio/mpeg");

        let mut stream = output.stream;
        let mut body = Vec::new();
        let mut saw_error = false;
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => body.extend_from_slice(&chunk),
                Err(e) => {
                    assert!(matches!(e, ConvertError::ConversionFailed { .. }));
                    saw_error = true;
                }
            }
        }

        assert_eq!(body, b"ID3partial");
        assert!(saw_error);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_transcode_streams_all_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "ffmpeg", "printf 'ID3'\nprintf 'frames'");

        let output = pipeline(script.to_str().unwrap())
            .start(
                &NoopExtractor,
                &audio_selection(),
                &metadata("Never Gonna Give You Up!"),
                TargetFormat::Mp3,
            )
            .await
            .unwrap();
        assert_eq!(output.filename, "Never Gonna Give You Up.mp3");
        assert!(output.stream.transcoder_pid().is_some());

        let chunks: Vec<_> = output.stream.collect().await;
        let body: Vec<u8> = chunks
            .into_iter()
            .flat_map(|chunk| chunk.unwrap().to_vec())
            .collect();
        assert_eq!(body, b"ID3frames");
    }

    #[cfg(target_os = "linux")]
    fn process_running(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            // state is the first field after the parenthesised command name
            Ok(stat) => stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.trim_start().chars().next())
                .is_some_and(|state| state != 'Z' && state != 'X'),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_dropping_stream_kills_transcoder() {
        // `yes` never exits on its own and blocks once the pipe is full
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "ffmpeg", "exec yes");

        let mut output = pipeline(script.to_str().unwrap())
            .start(
                &NoopExtractor,
                &audio_selection(),
                &metadata("Song"),
                TargetFormat::Mp3,
            )
            .await
            .unwrap();

        let pid = output.stream.transcoder_pid().unwrap();
        assert!(output.stream.next().await.unwrap().is_ok());
        assert!(process_running(pid));

        drop(output);

        let mut released = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if !process_running(pid) {
                released = true;
                break;
            }
        }
        assert!(released, "transcoder {} still running after drop", pid);
    }

    #[tokio::test]
    async fn test_passthrough_forwards_upstream_bytes() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/18")
            .with_status(200)
            .with_body("ftypisom-moov-mdat")
            .create_async()
            .await;

        let mut format = source("18", "mp4", "avc1.42001E", "mp4a.40.2");
        format.url = format!("{}/18", server.url());
        let selection = StreamSelection::Combined { source: format };

        let extractor = YtDlpExtractor::new(&ConvertOptions::new()).unwrap();
        let output = pipeline("/nonexistent/ffmpeg")
            .start(&extractor, &selection, &metadata("Clip"), TargetFormat::Mp4)
            .await
            .unwrap();

        assert_eq!(output.content_type, "video/mp4");
        assert!(output.stream.transcoder_pid().is_none());

        let chunks: Vec<_> = output.stream.collect().await;
        let body: Vec<u8> = chunks
            .into_iter()
            .flat_map(|chunk| chunk.unwrap().to_vec())
            .collect();
        assert_eq!(body, b"ftypisom-moov-mdat");
    }

    #[tokio::test]
    async fn test_passthrough_upstream_refusal_fails_before_output() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/18")
            .with_status(403)
            .create_async()
            .await;

        let mut format = source("18", "mp4", "avc1.42001E", "mp4a.40.2");
        format.url = format!("{}/18", server.url());
        let selection = StreamSelection::Combined { source: format };

        let extractor = YtDlpExtractor::new(&ConvertOptions::new()).unwrap();
        let result = pipeline("ffmpeg")
            .start(&extractor, &selection, &metadata("Clip"), TargetFormat::Mp4)
            .await;

        assert!(matches!(result, Err(ConvertError::UpstreamTransport { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tool_version() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "ffmpeg",
            "echo 'ffmpeg version 7.1 Copyright (c) 2000-2024'\necho 'built with gcc'",
        );

        let version = tool_version(script.to_str().unwrap(), "-version")
            .await
            .unwrap();
        assert_eq!(version, "ffmpeg version 7.1 Copyright (c) 2000-2024");

        assert!(tool_version("/nonexistent/ffmpeg", "-version").await.is_err());
    }
}
