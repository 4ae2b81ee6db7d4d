//! Process-wide stdout/stderr capture
//!
//! Redirects the standard output and error file descriptors into pipes so that
//! everything the process (or any library it links) writes can be mirrored
//! into the log file. Captured bytes are echoed to the original stream and
//! split into prefixed lines.
//!
//! A background thread drains the pipes so writers never block on a full
//! pipe. Callers drain the same pipes synchronously through [`StreamCapture::take_lines`],
//! which guarantees that everything written before the call is returned by it.

use std::io::Write;

use crate::error::LoggerResult;

/// One of the captured standard streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturedStream {
    Stdout,
    Stderr,
}

impl CapturedStream {
    pub fn name(&self) -> &'static str {
        match self {
            CapturedStream::Stdout => "stdout",
            CapturedStream::Stderr => "stderr",
        }
    }

    /// Prefix put in front of every captured line
    pub fn prefix(&self) -> &'static str {
        match self {
            CapturedStream::Stdout => "[stdout]: ",
            CapturedStream::Stderr => "[stderr]: ",
        }
    }

    fn flush_std(&self) {
        let _ = match self {
            CapturedStream::Stdout => std::io::stdout().flush(),
            CapturedStream::Stderr => std::io::stderr().flush(),
        };
    }
}

/// Splits a raw byte stream into prefixed, newline-terminated lines
#[derive(Debug)]
struct LineSplitter {
    prefix: &'static str,
    partial: Vec<u8>,
}

impl LineSplitter {
    fn new(stream: CapturedStream) -> Self {
        Self {
            prefix: stream.prefix(),
            partial: Vec::new(),
        }
    }

    /// Feed bytes, emitting every completed line
    fn feed(&mut self, bytes: &[u8], out: &mut Vec<String>) {
        self.partial.extend_from_slice(bytes);
        while let Some(pos) = self.partial.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.partial.drain(..=pos).collect();
            out.push(format_line(self.prefix, &line[..line.len() - 1]));
        }
    }

    /// Emit a trailing line that never got its newline
    fn finish(&mut self, out: &mut Vec<String>) {
        if !self.partial.is_empty() {
            let line = std::mem::take(&mut self.partial);
            out.push(format_line(self.prefix, &line));
        }
    }
}

/// Empty lines are written bare, without the prefix
fn format_line(prefix: &str, content: &[u8]) -> String {
    let text = String::from_utf8_lossy(content);
    let text = text.strip_suffix('\r').unwrap_or(&text);
    if text.is_empty() {
        "\n".to_string()
    } else {
        format!("{}{}\n", prefix, text)
    }
}

/// Handle owning the redirected standard streams
///
/// Streams are restored by [`StreamCapture::stop`], or on drop.
pub struct StreamCapture {
    #[cfg(unix)]
    active: Option<unix::Active>,
}

impl StreamCapture {
    /// Start capturing the selected streams
    ///
    /// Capturing neither stream yields an inactive handle.
    pub fn start(stdout: bool, stderr: bool) -> LoggerResult<Self> {
        let mut streams = Vec::new();
        if stdout {
            streams.push(CapturedStream::Stdout);
        }
        if stderr {
            streams.push(CapturedStream::Stderr);
        }

        if streams.is_empty() {
            return Ok(Self::inactive());
        }

        Self::start_streams(&streams)
    }

    fn inactive() -> Self {
        Self {
            #[cfg(unix)]
            active: None,
        }
    }

    #[cfg(unix)]
    fn start_streams(streams: &[CapturedStream]) -> LoggerResult<Self> {
        let active = unix::Active::start(streams)?;
        tracing::debug!(
            "Capturing {}",
            streams
                .iter()
                .map(|s| s.name())
                .collect::<Vec<_>>()
                .join(" and ")
        );
        Ok(Self {
            active: Some(active),
        })
    }

    #[cfg(not(unix))]
    fn start_streams(streams: &[CapturedStream]) -> LoggerResult<Self> {
        Err(crate::error::LoggerError::Capture {
            stream: streams[0].name(),
            source: std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "stream capture requires a unix platform",
            ),
        })
    }

    /// Take every complete line captured so far, in order
    pub fn take_lines(&self) -> Vec<String> {
        #[cfg(unix)]
        {
            if let Some(active) = &self.active {
                return active.take_lines();
            }
        }
        Vec::new()
    }

    /// Restore the original streams and return the remaining captured lines
    ///
    /// Calling this on an inactive handle returns nothing.
    pub fn stop(&mut self) -> Vec<String> {
        #[cfg(unix)]
        {
            if let Some(active) = self.active.take() {
                return active.stop();
            }
        }
        Vec::new()
    }
}

impl Drop for StreamCapture {
    fn drop(&mut self) {
        let dropped = self.stop();
        if !dropped.is_empty() {
            tracing::warn!(
                "Discarded {} captured lines on drop of an unclosed capture",
                dropped.len()
            );
        }
    }
}

#[cfg(unix)]
mod unix {
    use std::io;
    use std::os::unix::io::RawFd;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread::JoinHandle;

    use super::{CapturedStream, LineSplitter};
    use crate::error::{LoggerError, LoggerResult};

    /// Reader thread wake-up period, to notice the stop flag
    const POLL_TIMEOUT_MS: libc::c_int = 50;

    fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
        if ret == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(ret)
        }
    }

    fn target_fd(stream: CapturedStream) -> RawFd {
        match stream {
            CapturedStream::Stdout => libc::STDOUT_FILENO,
            CapturedStream::Stderr => libc::STDERR_FILENO,
        }
    }

    /// One redirected stream: the pipe we read from and the saved original
    struct Redirect {
        stream: CapturedStream,
        saved_fd: RawFd,
        read_fd: RawFd,
        splitter: LineSplitter,
        eof: bool,
    }

    impl Redirect {
        fn open(stream: CapturedStream) -> io::Result<Self> {
            let target = target_fd(stream);
            stream.flush_std();

            let saved_fd = cvt(unsafe { libc::dup(target) })?;

            let mut fds: [RawFd; 2] = [-1; 2];
            if let Err(e) = cvt(unsafe { libc::pipe(fds.as_mut_ptr()) }) {
                unsafe { libc::close(saved_fd) };
                return Err(e);
            }
            let [read_fd, write_fd] = fds;

            unsafe {
                let flags = libc::fcntl(read_fd, libc::F_GETFL);
                if flags != -1 {
                    libc::fcntl(read_fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
                }
                libc::fcntl(read_fd, libc::F_SETFD, libc::FD_CLOEXEC);
                libc::fcntl(saved_fd, libc::F_SETFD, libc::FD_CLOEXEC);
            }

            // From here on, every write to `target` lands in the pipe
            let redirected = cvt(unsafe { libc::dup2(write_fd, target) });
            unsafe { libc::close(write_fd) };
            if let Err(e) = redirected {
                unsafe {
                    libc::close(read_fd);
                    libc::close(saved_fd);
                }
                return Err(e);
            }

            Ok(Self {
                stream,
                saved_fd,
                read_fd,
                splitter: LineSplitter::new(stream),
                eof: false,
            })
        }

        /// Read everything currently in the pipe
        fn pump(&mut self, out: &mut Vec<String>) {
            let mut buf = [0u8; 4096];
            while !self.eof {
                let n = unsafe {
                    libc::read(
                        self.read_fd,
                        buf.as_mut_ptr() as *mut libc::c_void,
                        buf.len(),
                    )
                };
                if n > 0 {
                    let chunk = &buf[..n as usize];
                    echo(self.saved_fd, chunk);
                    self.splitter.feed(chunk, out);
                } else if n == 0 {
                    self.eof = true;
                } else {
                    let err = io::Error::last_os_error();
                    if err.kind() != io::ErrorKind::Interrupted {
                        break;
                    }
                }
            }
        }

        /// Point the standard descriptor back at the original stream
        ///
        /// This drops the last reference to the pipe's write end, so the
        /// reader sees EOF once it has drained what is left.
        fn restore(&self) -> io::Result<()> {
            cvt(unsafe { libc::dup2(self.saved_fd, target_fd(self.stream)) }).map(|_| ())
        }

        fn close(&self) {
            unsafe {
                libc::close(self.read_fd);
                libc::close(self.saved_fd);
            }
        }
    }

    /// Write captured bytes through to the original stream
    fn echo(fd: RawFd, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            let n = unsafe { libc::write(fd, bytes.as_ptr() as *const libc::c_void, bytes.len()) };
            if n > 0 {
                bytes = &bytes[n as usize..];
            } else if io::Error::last_os_error().kind() != io::ErrorKind::Interrupted {
                break;
            }
        }
    }

    /// State shared between the owner and the reader thread
    struct Shared {
        redirects: Vec<Redirect>,
        lines: Vec<String>,
    }

    impl Shared {
        fn pump(&mut self) {
            for redirect in self.redirects.iter_mut() {
                redirect.pump(&mut self.lines);
            }
        }
    }

    pub(super) struct Active {
        shared: Arc<Mutex<Shared>>,
        stop: Arc<AtomicBool>,
        reader: Option<JoinHandle<()>>,
    }

    impl Active {
        pub(super) fn start(streams: &[CapturedStream]) -> LoggerResult<Self> {
            let mut redirects: Vec<Redirect> = Vec::with_capacity(streams.len());
            for &stream in streams {
                match Redirect::open(stream) {
                    Ok(redirect) => redirects.push(redirect),
                    Err(source) => {
                        for redirect in &redirects {
                            let _ = redirect.restore();
                            redirect.close();
                        }
                        return Err(LoggerError::Capture {
                            stream: stream.name(),
                            source,
                        });
                    }
                }
            }

            let fds: Vec<RawFd> = redirects.iter().map(|r| r.read_fd).collect();
            let shared = Arc::new(Mutex::new(Shared {
                redirects,
                lines: Vec::new(),
            }));
            let stop = Arc::new(AtomicBool::new(false));

            let reader = {
                let shared = Arc::clone(&shared);
                let stop = Arc::clone(&stop);
                std::thread::Builder::new()
                    .name("trainlog-capture".to_string())
                    .spawn(move || reader_loop(shared, fds, stop))
            };

            match reader {
                Ok(handle) => Ok(Self {
                    shared,
                    stop,
                    reader: Some(handle),
                }),
                Err(source) => {
                    if let Ok(shared) = shared.lock() {
                        for redirect in &shared.redirects {
                            let _ = redirect.restore();
                            redirect.close();
                        }
                    }
                    Err(LoggerError::Capture {
                        stream: "reader thread",
                        source,
                    })
                }
            }
        }

        pub(super) fn take_lines(&self) -> Vec<String> {
            match self.shared.lock() {
                Ok(mut shared) => {
                    shared.pump();
                    std::mem::take(&mut shared.lines)
                }
                Err(_) => Vec::new(),
            }
        }

        pub(super) fn stop(mut self) -> Vec<String> {
            // Flushed before locking: a flush into a full pipe needs the reader
            CapturedStream::Stdout.flush_std();
            CapturedStream::Stderr.flush_std();

            let mut failed = Vec::new();
            if let Ok(shared) = self.shared.lock() {
                for redirect in &shared.redirects {
                    if let Err(e) = redirect.restore() {
                        failed.push((redirect.stream.name(), e));
                    }
                }
            }

            self.stop.store(true, Ordering::Release);
            if let Some(reader) = self.reader.take() {
                let _ = reader.join();
            }

            let mut lines = Vec::new();
            if let Ok(mut shared) = self.shared.lock() {
                shared.pump();
                let Shared { redirects, lines: captured } = &mut *shared;
                lines.append(captured);
                for redirect in redirects.iter_mut() {
                    redirect.splitter.finish(&mut lines);
                    redirect.close();
                }
                redirects.clear();
            }

            // Logged only once the streams are back in place
            for (stream, e) in failed {
                tracing::warn!("Failed to restore {}: {}", stream, e);
            }

            lines
        }
    }

    fn reader_loop(shared: Arc<Mutex<Shared>>, fds: Vec<RawFd>, stop: Arc<AtomicBool>) {
        let mut pollfds: Vec<libc::pollfd> = fds
            .iter()
            .map(|&fd| libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();

        while !stop.load(Ordering::Acquire) {
            for pollfd in pollfds.iter_mut() {
                pollfd.revents = 0;
            }

            let ready = unsafe {
                libc::poll(
                    pollfds.as_mut_ptr(),
                    pollfds.len() as libc::nfds_t,
                    POLL_TIMEOUT_MS,
                )
            };
            if ready <= 0 {
                continue;
            }

            let Ok(mut guard) = shared.lock() else {
                return;
            };
            guard.pump();
            // Negative fds are ignored by poll, so finished pipes stop waking us
            for (pollfd, redirect) in pollfds.iter_mut().zip(guard.redirects.iter()) {
                if redirect.eof {
                    pollfd.fd = -1;
                }
            }
            if guard.redirects.iter().all(|r| r.eof) {
                return;
            }
        }
    }
}
