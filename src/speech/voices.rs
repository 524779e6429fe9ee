//! Voice listing and curation for the speech command.

/// A synthesizer voice. `id` is what gets passed back as `-v <id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub name: String,
    pub lang: String,
    pub id: String,
}

/// Parse `espeak-ng --voices` output:
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  2  en-us           --/M      English_(America)  gmw/en-US            (en 3)
/// ```
pub fn parse_voice_list(output: &str) -> Vec<Voice> {
    output
        .lines()
        .filter(|line| !line.trim_start().starts_with("Pty"))
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 5 {
                return None;
            }
            Some(Voice {
                name: cols[3].replace('_', " "),
                lang: cols[1].to_string(),
                id: cols[4].to_string(),
            })
        })
        .collect()
}

/// The voices offered to the user and the one currently selected.
#[derive(Debug, Clone, Default)]
pub struct VoiceBook {
    voices: Vec<Voice>,
    selected: Option<String>,
}

impl VoiceBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the offered list from a fresh listing.
    ///
    /// Preferred names are taken in order; when none of them exist every
    /// English voice is offered instead. A `configured` id wins the initial
    /// selection, otherwise the first offered voice does. A selection that
    /// is still offered is kept.
    pub fn update(&mut self, all: &[Voice], preferred: &[String], configured: &str) {
        let mut offered: Vec<Voice> = preferred
            .iter()
            .filter_map(|name| all.iter().find(|v| &v.name == name))
            .cloned()
            .collect();
        if offered.is_empty() {
            offered = all
                .iter()
                .filter(|v| v.lang.starts_with("en"))
                .cloned()
                .collect();
        }

        if self.selected.is_none() && !configured.is_empty() {
            if let Some(voice) = all.iter().find(|v| v.id == configured) {
                if !offered.contains(voice) {
                    offered.insert(0, voice.clone());
                }
                self.selected = Some(voice.id.clone());
            } else {
                log::warn!("[Speech] Configured voice {:?} not installed", configured);
            }
        }

        self.voices = offered;
        let still_offered = self
            .selected
            .as_ref()
            .is_some_and(|id| self.voices.iter().any(|v| &v.id == id));
        if !still_offered {
            self.selected = self.voices.first().map(|v| v.id.clone());
        }
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    pub fn selected(&self) -> Option<&Voice> {
        let id = self.selected.as_ref()?;
        self.voices.iter().find(|v| &v.id == id)
    }

    /// Select by id, or by name ignoring case.
    pub fn select(&mut self, query: &str) -> Option<&Voice> {
        let query = query.trim();
        let index = self.voices.iter().position(|v| v.id == query).or_else(|| {
            self.voices
                .iter()
                .position(|v| v.name.eq_ignore_ascii_case(query))
        })?;
        self.selected = Some(self.voices[index].id.clone());
        self.voices.get(index)
    }

    /// Move the selection to the next offered voice, wrapping around.
    pub fn cycle(&mut self) -> Option<&Voice> {
        if self.voices.is_empty() {
            return None;
        }
        let next = self
            .selected
            .as_ref()
            .and_then(|id| self.voices.iter().position(|v| &v.id == id))
            .map_or(0, |i| (i + 1) % self.voices.len());
        self.selected = Some(self.voices[next].id.clone());
        self.voices.get(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  af              --/M      Afrikaans          gmw/af
 2  en-gb           --/M      English_(Great_Britain) gmw/en            (en 2)
 2  en-us           --/M      English_(America)  gmw/en-US            (en 3)
 5  de              --/M      German             gmw/de
";

    fn preferred(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn listing_is_parsed() {
        let voices = parse_voice_list(LISTING);
        assert_eq!(voices.len(), 4);
        assert_eq!(
            voices[2],
            Voice {
                name: "English (America)".into(),
                lang: "en-us".into(),
                id: "gmw/en-US".into(),
            }
        );
        assert_eq!(voices[1].name, "English (Great Britain)");
    }

    #[test]
    fn garbage_lines_are_skipped() {
        assert!(parse_voice_list("").is_empty());
        assert!(parse_voice_list("espeak-ng: not found\n").is_empty());
    }

    #[test]
    fn preferred_names_are_offered_in_order() {
        let all = parse_voice_list(LISTING);
        let mut book = VoiceBook::new();
        book.update(&all, &preferred(&["German", "English (America)", "Klingon"]), "");
        let names: Vec<&str> = book.voices().iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["German", "English (America)"]);
        assert_eq!(book.selected().unwrap().name, "German");
    }

    #[test]
    fn falls_back_to_english_voices() {
        let all = parse_voice_list(LISTING);
        let mut book = VoiceBook::new();
        book.update(&all, &preferred(&["Samantha"]), "");
        assert_eq!(book.voices().len(), 2);
        assert!(book.voices().iter().all(|v| v.lang.starts_with("en")));
        assert_eq!(book.selected().unwrap().id, "gmw/en");
    }

    #[test]
    fn configured_voice_wins_initial_selection() {
        let all = parse_voice_list(LISTING);
        let mut book = VoiceBook::new();
        book.update(&all, &preferred(&["English (America)"]), "gmw/de");
        assert_eq!(book.selected().unwrap().name, "German");
        assert_eq!(book.voices().len(), 2);
    }

    #[test]
    fn selection_survives_refresh() {
        let all = parse_voice_list(LISTING);
        let mut book = VoiceBook::new();
        book.update(&all, &[], "");
        book.select("english (america)").unwrap();
        book.update(&all, &[], "");
        assert_eq!(book.selected().unwrap().id, "gmw/en-US");
    }

    #[test]
    fn empty_listing_selects_nothing() {
        let mut book = VoiceBook::new();
        book.update(&[], &preferred(&["English (America)"]), "");
        assert!(book.is_empty());
        assert!(book.selected().is_none());
        assert!(book.cycle().is_none());
    }

    #[test]
    fn cycle_wraps_around() {
        let all = parse_voice_list(LISTING);
        let mut book = VoiceBook::new();
        book.update(&all, &[], "");
        assert_eq!(book.cycle().unwrap().id, "gmw/en-US");
        assert_eq!(book.cycle().unwrap().id, "gmw/en");
    }

    #[test]
    fn unknown_selection_is_rejected() {
        let all = parse_voice_list(LISTING);
        let mut book = VoiceBook::new();
        book.update(&all, &[], "");
        assert!(book.select("nobody").is_none());
        assert_eq!(book.selected().unwrap().id, "gmw/en");
    }
}
