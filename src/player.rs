// Minimal MPD client
// Reads the player status and current song, and waits for player changes

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;

use crate::error::PlayerError;
use crate::model::{Fields, PlaybackStatus, Song};

/// One observation of the player
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub status: PlaybackStatus,
    pub song: Option<Song>,
}

pub struct MpdClient<S> {
    stream: BufReader<S>,
    version: String,
}

impl MpdClient<TcpStream> {
    /// Connect over TCP and authenticate when a password is given
    pub fn connect(host: &str, port: u16, password: Option<&str>) -> Result<Self, PlayerError> {
        let stream = TcpStream::connect((host, port))?;
        let client = Self::handshake(stream, password)?;
        log::info!("Connected to {}:{} (MPD {})", host, port, client.version());
        Ok(client)
    }
}

impl<S: Read + Write> MpdClient<S> {
    /// Read the greeting on an open stream
    pub fn handshake(stream: S, password: Option<&str>) -> Result<Self, PlayerError> {
        let mut stream = BufReader::new(stream);

        let mut greeting = String::new();
        if stream.read_line(&mut greeting)? == 0 {
            return Err(PlayerError::Closed);
        }
        let version = greeting
            .trim_end()
            .strip_prefix("OK MPD ")
            .ok_or_else(|| PlayerError::Handshake(greeting.trim_end().to_string()))?
            .to_string();

        let mut client = Self { stream, version };
        if let Some(password) = password {
            client.command(&format!("password {}", quote(password)))?;
        }
        Ok(client)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Current status and song
    pub fn observe(&mut self) -> Result<Observation, PlayerError> {
        let status = self.command("status")?;
        let song = self.command("currentsong")?;

        log::debug!(
            "Current status {} {:?}",
            status.get("state").map(String::as_str).unwrap_or("?"),
            song.get("file")
        );

        let status = PlaybackStatus::from_fields(&status)?;
        let song = if song.is_empty() {
            None
        } else {
            Some(Song::from_fields(&song)?)
        };

        Ok(Observation { status, song })
    }

    /// Block until MPD reports a change in the player subsystem
    pub fn wait_for_player(&mut self) -> Result<(), PlayerError> {
        loop {
            let changes = self.command("idle player")?;
            if changes.get("changed").map(String::as_str) == Some("player") {
                return Ok(());
            }
        }
    }

    fn command(&mut self, command: &str) -> Result<Fields, PlayerError> {
        let stream = self.stream.get_mut();
        stream.write_all(command.as_bytes())?;
        stream.write_all(b"\n")?;
        stream.flush()?;
        self.read_response()
    }

    fn read_response(&mut self) -> Result<Fields, PlayerError> {
        let mut fields = Fields::new();
        let mut line = String::new();

        loop {
            line.clear();
            if self.stream.read_line(&mut line)? == 0 {
                return Err(PlayerError::Closed);
            }
            let line = line.trim_end_matches(['\r', '\n']);

            if line == "OK" {
                return Ok(fields);
            }
            if let Some(error) = line.strip_prefix("ACK ") {
                return Err(PlayerError::Ack(error.to_string()));
            }
            match line.split_once(": ") {
                // first value wins for multi-valued tags
                Some((key, value)) => {
                    fields
                        .entry(key.to_ascii_lowercase())
                        .or_insert_with(|| value.to_string());
                }
                None => log::debug!("Ignoring MPD line: {}", line),
            }
        }
    }
}

fn quote(arg: &str) -> String {
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PlaybackState;
    use std::io::{self, Cursor};

    /// Replays canned server output and records what the client sent
    struct FakeServer {
        input: Cursor<Vec<u8>>,
        sent: Vec<u8>,
    }

    impl FakeServer {
        fn new(output: &str) -> Self {
            Self {
                input: Cursor::new(output.as_bytes().to_vec()),
                sent: Vec::new(),
            }
        }
    }

    impl Read for FakeServer {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for FakeServer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.sent.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn sent(client: &mut MpdClient<FakeServer>) -> String {
        String::from_utf8_lossy(&client.stream.get_mut().sent).into_owned()
    }

    #[test]
    fn observes_status_and_song() {
        let server = FakeServer::new(
            "OK MPD 0.23.5\n\
             volume: 80\nstate: play\nelapsed: 12.345\nOK\n\
             file: Track01.flac\nTitle: Beyond The Sea\nArtist: The Chessnuts\n\
             Artist: Someone Else\nTime: 177\nduration: 177.000\nOK\n",
        );
        let mut client = MpdClient::handshake(server, None).expect("handshake");
        assert_eq!(client.version(), "0.23.5");

        let observation = client.observe().expect("observe");
        assert_eq!(observation.status.state(), PlaybackState::Playing);
        assert_eq!(observation.status.elapsed_millis(), Some(12_345));

        let song = observation.song.expect("song");
        assert_eq!(song.artist.as_deref(), Some("The Chessnuts"));
        assert_eq!(song.title.as_deref(), Some("Beyond The Sea"));
        assert_eq!(song.length_millis, Some(177_000));

        assert_eq!(sent(&mut client), "status\ncurrentsong\n");
    }

    #[test]
    fn stopped_with_empty_playlist_has_no_song() {
        let server = FakeServer::new("OK MPD 0.23.5\nstate: stop\nOK\nOK\n");
        let mut client = MpdClient::handshake(server, None).expect("handshake");

        let observation = client.observe().expect("observe");
        assert_eq!(observation.status, PlaybackStatus::stopped());
        assert_eq!(observation.song, None);
    }

    #[test]
    fn unknown_state_is_a_parse_error() {
        let server = FakeServer::new("OK MPD 0.23.5\nstate: rewind\nelapsed: 1\nOK\nOK\n");
        let mut client = MpdClient::handshake(server, None).expect("handshake");

        let err = client.observe().unwrap_err();
        assert!(matches!(err, PlayerError::Parse(_)), "{err}");
    }

    #[test]
    fn waits_for_player_changes() {
        let server = FakeServer::new("OK MPD 0.23.5\nchanged: mixer\nOK\nchanged: player\nOK\n");
        let mut client = MpdClient::handshake(server, None).expect("handshake");

        client.wait_for_player().expect("wait");
        assert_eq!(sent(&mut client), "idle player\nidle player\n");
    }

    #[test]
    fn sends_quoted_password() {
        let server = FakeServer::new("OK MPD 0.23.5\nOK\n");
        let mut client = MpdClient::handshake(server, Some(r#"se"cr\et"#)).expect("handshake");
        assert_eq!(sent(&mut client), "password \"se\\\"cr\\\\et\"\n");
    }

    #[test]
    fn ack_and_bad_greeting_are_errors() {
        let server = FakeServer::new("OK MPD 0.23.5\nACK [4@0] {status} you don't have permission\n");
        let mut client = MpdClient::handshake(server, None).expect("handshake");
        assert!(matches!(client.observe(), Err(PlayerError::Ack(_))));

        let err = MpdClient::handshake(FakeServer::new("HTTP/1.1 400\n"), None)
            .err()
            .expect("handshake error");
        assert!(matches!(err, PlayerError::Handshake(_)));

        let err = MpdClient::handshake(FakeServer::new(""), None)
            .err()
            .expect("closed");
        assert!(matches!(err, PlayerError::Closed));
    }
}
