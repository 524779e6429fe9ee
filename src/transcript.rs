//! Conversation log rendering for the terminal.

use std::io::{self, Write};

use crate::conversation::{ChatMessage, Sender};

fn prefix(sender: Sender) -> &'static str {
    match sender {
        Sender::User => "you> ",
        Sender::Ai => "aura> ",
        Sender::System => "system> ",
    }
}

/// Prints log entries as they appear. The most recent line is left open
/// so a streaming reply can be extended in place.
#[derive(Debug, Default)]
pub struct Transcript {
    shown: Vec<String>,
    // Index of the entry the cursor sits after, if its line is still open.
    open: Option<usize>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Print whatever changed in `log` since the last call.
    pub fn sync<W: Write>(&mut self, log: &[ChatMessage], out: &mut W) -> io::Result<()> {
        for (i, message) in log.iter().enumerate() {
            let extend_from = match self.shown.get(i) {
                Some(old) if *old == message.text => continue,
                Some(old) if self.open == Some(i) && message.text.starts_with(old.as_str()) => {
                    Some(old.len())
                }
                _ => None,
            };
            match extend_from {
                Some(from) => out.write_all(message.text[from..].as_bytes())?,
                None => self.print(i, message, out)?,
            }
            match self.shown.get_mut(i) {
                Some(shown) => shown.clone_from(&message.text),
                None => self.shown.push(message.text.clone()),
            }
        }
        out.flush()
    }

    fn print<W: Write>(&mut self, index: usize, message: &ChatMessage, out: &mut W) -> io::Result<()> {
        if self.open.is_some() {
            writeln!(out)?;
        }
        write!(out, "{}{}", prefix(message.sender), message.text)?;
        self.open = Some(index);
        Ok(())
    }

    /// Terminate the open line, e.g. before exit.
    pub fn close<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        if self.open.take().is_some() {
            writeln!(out)?;
        }
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(sender: Sender, text: &str) -> ChatMessage {
        ChatMessage {
            sender,
            text: text.to_string(),
        }
    }

    fn render(transcript: &mut Transcript, log: &[ChatMessage], out: &mut Vec<u8>) -> String {
        let start = out.len();
        transcript.sync(log, out).unwrap();
        String::from_utf8(out[start..].to_vec()).unwrap()
    }

    #[test]
    fn new_entries_get_their_own_line() {
        let mut t = Transcript::new();
        let mut out = Vec::new();
        let log = vec![msg(Sender::Ai, "hello"), msg(Sender::User, "hi")];
        assert_eq!(render(&mut t, &log, &mut out), "aura> hello\nyou> hi");
        assert_eq!(render(&mut t, &log, &mut out), "");
    }

    #[test]
    fn streaming_reply_prints_only_the_suffix() {
        let mut t = Transcript::new();
        let mut out = Vec::new();
        let mut log = vec![msg(Sender::User, "q"), msg(Sender::Ai, "")];
        assert_eq!(render(&mut t, &log, &mut out), "you> q\naura> ");
        log[1].text = "Hel".into();
        assert_eq!(render(&mut t, &log, &mut out), "Hel");
        log[1].text = "Hello world.".into();
        assert_eq!(render(&mut t, &log, &mut out), "lo world.");
        t.close(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "you> q\naura> Hello world.\n"
        );
    }

    #[test]
    fn replaced_text_is_reprinted() {
        let mut t = Transcript::new();
        let mut out = Vec::new();
        let mut log = vec![msg(Sender::Ai, "Par")];
        render(&mut t, &log, &mut out);
        log[0].text = "Sorry".into();
        assert_eq!(render(&mut t, &log, &mut out), "\naura> Sorry");
    }

    #[test]
    fn older_entries_are_reprinted_not_extended() {
        let mut t = Transcript::new();
        let mut out = Vec::new();
        let mut log = vec![msg(Sender::Ai, "a"), msg(Sender::System, "note")];
        render(&mut t, &log, &mut out);
        log[0].text = "ab".into();
        assert_eq!(render(&mut t, &log, &mut out), "\naura> ab");
    }
}
