use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use super::{LineSink, OutputLine};

/// Drain stdout and stderr concurrently, forwarding each line to `sink`.
/// Returns the captured (stdout, stderr). Invalid UTF-8 is replaced, not fatal.
pub(crate) async fn pump<O, E>(
    stdout: O,
    stderr: E,
    sink: &mut LineSink<'_>,
) -> std::io::Result<(String, String)>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut out_reader = BufReader::new(stdout);
    let mut err_reader = BufReader::new(stderr);
    // read_until keeps partial reads in these buffers if select cancels it
    let mut out_buf = Vec::new();
    let mut err_buf = Vec::new();
    let mut out = String::new();
    let mut err = String::new();
    let mut out_open = true;
    let mut err_open = true;

    while out_open || err_open {
        tokio::select! {
            read = out_reader.read_until(b'\n', &mut out_buf), if out_open => {
                if read? == 0 {
                    out_open = false;
                }
                if !out_buf.is_empty() {
                    let line = take_line(&mut out_buf);
                    sink(OutputLine::Stdout(&line));
                    out.push_str(&line);
                    out.push('\n');
                }
            },
            read = err_reader.read_until(b'\n', &mut err_buf), if err_open => {
                if read? == 0 {
                    err_open = false;
                }
                if !err_buf.is_empty() {
                    let line = take_line(&mut err_buf);
                    sink(OutputLine::Stderr(&line));
                    err.push_str(&line);
                    err.push('\n');
                }
            },
        }
    }

    Ok((out, err))
}

fn take_line(buf: &mut Vec<u8>) -> String {
    let line = String::from_utf8_lossy(buf)
        .trim_end_matches(['\n', '\r'])
        .to_string();
    buf.clear();
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forwards_every_line_and_captures_both_streams() {
        let stdout: &[u8] = b"PROGRESS:10:one\nhello\n";
        let stderr: &[u8] = b"warning\n";
        let mut seen = Vec::new();

        let (out, err) = pump(stdout, stderr, &mut |line: OutputLine<'_>| {
            seen.push(line.text().to_string())
        })
        .await
        .unwrap();

        assert_eq!(out, "PROGRESS:10:one\nhello\n");
        assert_eq!(err, "warning\n");
        assert_eq!(seen.len(), 3);
        assert!(seen.contains(&"hello".to_string()));
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced_instead_of_failing() {
        let stdout: &[u8] = b"ok\n\xff\xfe build\r\nlast without newline";
        let stderr: &[u8] = b"";
        let mut seen = Vec::new();

        let (out, _) = pump(stdout, stderr, &mut |line: OutputLine<'_>| {
            seen.push(line.text().to_string())
        })
        .await
        .unwrap();

        assert_eq!(
            seen,
            vec!["ok", "\u{FFFD}\u{FFFD} build", "last without newline"]
        );
        assert_eq!(out, "ok\n\u{FFFD}\u{FFFD} build\nlast without newline\n");
    }
}
