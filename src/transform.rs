// Song transformers
// Applied to an observed song before it reaches the scrobbling machine

use std::path::Path;

use regex::Regex;

use crate::config::TagGuessConfig;
use crate::model::Song;

/// Best-effort metadata completion. Implementations must be idempotent and
/// must leave a song that already has artist and title untouched.
pub trait SongTransformer {
    fn transform(&self, song: Song) -> Song;
}

/// Transformer that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl SongTransformer for Passthrough {
    fn transform(&self, song: Song) -> Song {
        song
    }
}

/// Guesses artist and title from the title tag or the file name
pub struct TagGuesser {
    patterns: Vec<Regex>,
}

impl TagGuesser {
    /// Create a tag guesser from config
    pub fn new(config: &TagGuessConfig) -> Self {
        if config.enabled {
            Self::from_patterns(&config.patterns)
        } else {
            Self {
                patterns: Vec::new(),
            }
        }
    }

    /// Compile patterns, skipping any that are invalid or lack the
    /// `artist` and `title` named groups
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|pattern| {
                let pattern: &str = pattern.as_ref();
                // anchored like a prefix match
                match Regex::new(&format!("^(?:{})", pattern)) {
                    Ok(re) if has_groups(&re) => Some(re),
                    Ok(_) => {
                        log::warn!(
                            "Tag guess pattern '{}' needs 'artist' and 'title' groups",
                            pattern
                        );
                        None
                    }
                    Err(e) => {
                        log::warn!("Invalid regex pattern '{}': {}", pattern, e);
                        None
                    }
                }
            })
            .collect();

        Self { patterns }
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    fn guess(&self, name: &str) -> Option<(String, String)> {
        self.patterns.iter().find_map(|pattern| {
            let caps = pattern.captures(name)?;
            let artist = caps.name("artist")?.as_str().trim();
            let title = caps.name("title")?.as_str().trim();
            if artist.is_empty() || title.is_empty() {
                None
            } else {
                Some((artist.to_string(), title.to_string()))
            }
        })
    }
}

fn has_groups(re: &Regex) -> bool {
    let names: Vec<&str> = re.capture_names().flatten().collect();
    names.contains(&"artist") && names.contains(&"title")
}

impl SongTransformer for TagGuesser {
    fn transform(&self, mut song: Song) -> Song {
        if song.tags().is_some() {
            return song;
        }

        let name = match song.title.as_deref().filter(|t| !t.is_empty()) {
            Some(title) => title.to_string(),
            None => {
                let path = Path::new(&song.file);
                let name = if song.is_stream() {
                    path.file_name()
                } else {
                    path.file_stem()
                };
                match name {
                    Some(name) => name.to_string_lossy().into_owned(),
                    None => return song,
                }
            }
        };

        match self.guess(&name) {
            Some((artist, title)) => {
                log::debug!("Guessed tags for {}: {} - {}", song.file, artist, title);
                song.artist = Some(artist);
                song.title = Some(title);
            }
            None => log::debug!("Could not guess tags for {}", song.file),
        }

        song
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guesser() -> TagGuesser {
        TagGuesser::from_patterns(&["(?P<artist>.+) - (?P<title>.+)"])
    }

    #[test]
    fn passthrough_keeps_untagged_song() {
        let song = Song::new("A - B.ogg");
        assert_eq!(Passthrough.transform(song.clone()), song);
    }

    #[test]
    fn complete_song_is_untouched() {
        let song = Song::new("Other - Name.flac")
            .with_artist("Artist")
            .with_title("Title");
        assert_eq!(guesser().transform(song.clone()), song);
    }

    #[test]
    fn guesses_from_title() {
        let song = Song::new("http://radio").with_title("Bill Doggett - Blip Blop");
        let song = guesser().transform(song);
        assert_eq!(song.artist.as_deref(), Some("Bill Doggett"));
        assert_eq!(song.title.as_deref(), Some("Blip Blop"));
    }

    #[test]
    fn guesses_from_file_stem() {
        let song = Song::new("incoming/The Big Six - No Way Out.mp3").with_length_secs(150);
        let song = guesser().transform(song);
        assert_eq!(song.artist.as_deref(), Some("The Big Six"));
        assert_eq!(song.title.as_deref(), Some("No Way Out"));
        assert!(song.is_eligible());
    }

    #[test]
    fn is_idempotent() {
        let g = guesser();
        let once = g.transform(Song::new("A - B.ogg"));
        let twice = g.transform(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn unmatched_name_leaves_song_alone() {
        let song = Song::new("track01.flac").with_artist("Someone");
        assert_eq!(guesser().transform(song.clone()), song);
    }

    #[test]
    fn bad_patterns_are_skipped() {
        let g = TagGuesser::from_patterns(&[
            "(?P<artist>.+",
            "(.+) - (.+)",
            "(?P<artist>.+)_(?P<title>.+)",
        ]);
        assert_eq!(g.pattern_count(), 1);
    }

    #[test]
    fn disabled_config_compiles_nothing() {
        let config = TagGuessConfig {
            enabled: false,
            ..TagGuessConfig::default()
        };
        assert_eq!(TagGuesser::new(&config).pattern_count(), 0);
    }
}
