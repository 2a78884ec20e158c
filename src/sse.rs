//! Server-sent event framing for rendered chunks.

/// Frame `chunk` as one event: a `data:` line per payload line, then a blank line.
pub fn frame(chunk: &str) -> String {
    let mut event = String::with_capacity(chunk.len() + 8);
    for line in chunk.split("\r\n").flat_map(|l| l.split(['\r', '\n'])) {
        event.push_str("data: ");
        event.push_str(line);
        event.push('\n');
    }
    event.push('\n');
    event
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_chunk() {
        assert_eq!(frame("a<br>b<br>"), "data: a<br>b<br>\n\n");
    }

    #[test]
    fn embedded_newlines_never_end_the_event() {
        let event = frame("one\n\ntwo\r\nthree\r");
        assert_eq!(event, "data: one\ndata: \ndata: two\ndata: three\ndata: \n\n");
        assert_eq!(event.matches("\n\n").count(), 1);
        assert!(event.ends_with("\n\n"));
    }

    #[test]
    fn empty_chunk() {
        assert_eq!(frame(""), "data: \n\n");
    }
}
