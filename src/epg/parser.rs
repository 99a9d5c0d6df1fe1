//! XMLTV channel parser
//! Streams `<channel>` entries out of an XMLTV document; programme data is skipped.
//! Supports both plain XML and gzip-compressed (.xml.gz) files

use flate2::read::GzDecoder;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::io::{BufRead, Read};
use std::path::Path;

use crate::download::{self, DownloadConfig};
use crate::error::{Error, Result};

/// Channel information from EPG
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpgChannel {
    /// XMLTV channel id, assigned as tvg-id
    pub id: String,
    /// First display name
    pub name: String,
    /// Channel icon/logo URL (optional)
    pub icon: Option<String>,
    /// Channel website (optional)
    pub url: Option<String>,
}

/// Parsed EPG channel list
#[derive(Debug, Clone, Default)]
pub struct EpgData {
    /// Channels in document order
    pub channels: Vec<EpgChannel>,
    /// Parse errors encountered (up to 50)
    pub parse_errors: Vec<String>,
    /// Total count of parse errors
    pub parse_error_count: usize,
}

impl EpgData {
    pub fn find_by_id(&self, id: &str) -> Option<&EpgChannel> {
        if id.is_empty() {
            return None;
        }
        self.channels.iter().find(|c| c.id == id)
    }

    /// Case-insensitive display name lookup
    pub fn find_by_name(&self, name: &str) -> Option<&EpgChannel> {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            return None;
        }
        self.channels
            .iter()
            .find(|c| c.name.trim().to_lowercase() == name)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Parser state
#[derive(Debug, Clone, Copy, PartialEq)]
enum ParserState {
    Root,
    Channel,
    DisplayName,
    Url,
}

/// EPG Parser for XMLTV format - streaming, memory efficient
pub struct EpgParser;

impl EpgParser {
    /// Parse EPG from XMLTV string (for smaller files)
    pub fn parse(xml: &str) -> Result<EpgData> {
        Self::parse_reader(SanitizingBufReader::new(xml.as_bytes()))
    }

    /// Parse raw bytes, plain or gzip-compressed
    pub fn parse_bytes(bytes: Vec<u8>) -> Result<EpgData> {
        let bytes = download::maybe_gunzip(bytes)?;
        Self::parse_reader(SanitizingBufReader::new(bytes.as_slice()))
    }

    /// Parse EPG from a reader - streaming, handles large files
    pub fn parse_reader<R: BufRead>(reader: R) -> Result<EpgData> {
        let mut xml_reader = Reader::from_reader(reader);
        xml_reader.config_mut().trim_text(false);

        let mut epg = EpgData::default();
        let mut buf = Vec::with_capacity(8192);

        let mut state = ParserState::Root;
        let mut current_channel: Option<EpgChannel> = None;
        let mut text_buf = String::new();
        let mut error_count = 0;
        let mut errors: Vec<String> = Vec::new();
        let mut saw_root = false;

        loop {
            let position = xml_reader.buffer_position();
            match xml_reader.read_event_into(&mut buf) {
                Ok(Event::Empty(ref e)) if e.name().as_ref() == b"channel" => {
                    if let Some(id) = get_attribute(e, b"id").filter(|id| !id.is_empty()) {
                        epg.channels.push(EpgChannel {
                            id,
                            ..Default::default()
                        });
                    }
                }
                Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                    let name = e.name();
                    match name.as_ref() {
                        b"tv" => saw_root = true,
                        b"channel" => {
                            state = ParserState::Channel;
                            let id = get_attribute(e, b"id").unwrap_or_default();
                            current_channel = Some(EpgChannel {
                                id,
                                ..Default::default()
                            });
                        }
                        b"display-name" if state == ParserState::Channel => {
                            state = ParserState::DisplayName;
                            text_buf.clear();
                        }
                        b"url" if state == ParserState::Channel => {
                            state = ParserState::Url;
                            text_buf.clear();
                        }
                        b"icon" if state == ParserState::Channel => {
                            if let (Some(src), Some(chan)) =
                                (get_attribute(e, b"src"), current_channel.as_mut())
                            {
                                if chan.icon.is_none() && !src.is_empty() {
                                    chan.icon = Some(src);
                                }
                            }
                        }
                        _ => {}
                    }
                }
                Ok(Event::Text(e)) => {
                    if matches!(state, ParserState::DisplayName | ParserState::Url) {
                        // Get raw bytes and convert to string
                        let raw = String::from_utf8_lossy(e.as_ref()).to_string();
                        text_buf.push_str(&decode_xml_entities(&raw));
                    }
                }
                Ok(Event::GeneralRef(e)) => {
                    if matches!(state, ParserState::DisplayName | ParserState::Url) {
                        let entity = format!("&{};", String::from_utf8_lossy(&e));
                        text_buf.push_str(&decode_xml_entities(&entity));
                    }
                }
                Ok(Event::End(ref e)) => {
                    let name = e.name();
                    match name.as_ref() {
                        b"channel" => {
                            if let Some(channel) = current_channel.take() {
                                if !channel.id.is_empty() {
                                    epg.channels.push(channel);
                                }
                            }
                            state = ParserState::Root;
                        }
                        b"display-name" if state == ParserState::DisplayName => {
                            if let Some(ref mut chan) = current_channel {
                                if chan.name.is_empty() {
                                    chan.name = text_buf.trim().to_string();
                                }
                            }
                            state = ParserState::Channel;
                        }
                        b"url" if state == ParserState::Url => {
                            if let Some(ref mut chan) = current_channel {
                                let url = text_buf.trim();
                                if chan.url.is_none() && !url.is_empty() {
                                    chan.url = Some(url.to_string());
                                }
                            }
                            state = ParserState::Channel;
                        }
                        _ => {}
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    error_count += 1;
                    if errors.len() < 50 {
                        errors.push(format!("XML error at byte {}: {}", position, e));
                    }
                    if error_count > 1000 {
                        return Err(Error::Xml(format!(
                            "Too many XML errors, last at byte {}: {}",
                            position, e
                        )));
                    }
                    // Reset state to root to skip malformed element
                    current_channel = None;
                    state = ParserState::Root;
                    text_buf.clear();
                }
                _ => {}
            }
            buf.clear();
        }

        if !saw_root && epg.channels.is_empty() {
            return Err(Error::Xml("Not an XMLTV document".to_string()));
        }

        epg.parse_errors = errors;
        epg.parse_error_count = error_count;

        // Return what we got, even if partially parsed
        Ok(epg)
    }

    /// Parse EPG from file - auto-detects gzip compression
    pub fn parse_file(path: &Path) -> Result<EpgData> {
        let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
        let mut reader = std::io::BufReader::with_capacity(64 * 1024, file);

        // Peek at the first 2 bytes for the gzip magic number (1f 8b)
        let is_gzip = {
            let head = reader.fill_buf().map_err(|e| Error::io(path, e))?;
            head.len() >= 2 && head[0] == 0x1f && head[1] == 0x8b
        };

        if is_gzip {
            let decoder = GzDecoder::new(reader);
            let buf_reader = std::io::BufReader::with_capacity(64 * 1024, decoder);
            Self::parse_reader(SanitizingBufReader::new(buf_reader))
        } else {
            Self::parse_reader(SanitizingBufReader::new(reader))
        }
    }
}

/// Load channels from a URL or local path
pub fn load_source(source: &str, config: &DownloadConfig) -> Result<EpgData> {
    let epg = if download::is_remote(source) {
        let ext = if source.ends_with(".gz") { "xml.gz" } else { "xml" };
        let temp_path = std::env::temp_dir().join(format!(
            "m3u_manager_epg_{}.{}",
            std::process::id(),
            ext
        ));
        download::download_to_file(source, &temp_path, config, None)?;
        let result = EpgParser::parse_file(&temp_path);
        let _ = std::fs::remove_file(&temp_path);
        result?
    } else {
        EpgParser::parse_file(Path::new(source))?
    };
    if epg.parse_error_count > 0 {
        log::warn!(
            "EPG {} parsed with {} errors",
            source,
            epg.parse_error_count
        );
    }
    Ok(epg)
}

/// BufReader wrapper that filters out illegal XML 1.0 characters on read
/// Legal XML 1.0: #x9 | #xA | #xD | [#x20-#xD7FF] | [#xE000-#xFFFD] | [#x10000-#x10FFFF]
/// Also replaces unescaped ampersands
struct SanitizingBufReader<R> {
    inner: R,
    buffer: Vec<u8>,
    out_buffer: Vec<u8>,
    pos: usize,
    filled: usize,
}

impl<R: Read> SanitizingBufReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: vec![0u8; 64 * 1024],
            out_buffer: Vec::with_capacity(96 * 1024), // Slightly larger for escapes
            pos: 0,
            filled: 0,
        }
    }

    fn sanitize_byte(b: u8) -> u8 {
        match b {
            0x09 | 0x0A | 0x0D => b, // Tab, LF, CR - keep
            0x00..=0x1F => 0x20,     // Control chars -> space
            0x7F => 0x20,            // DEL -> space
            _ => b,
        }
    }

    fn refill_buffer(&mut self) -> std::io::Result<()> {
        let n = self.inner.read(&mut self.buffer)?;
        self.out_buffer.clear();

        for i in 0..n {
            let b = Self::sanitize_byte(self.buffer[i]);
            // Bare & that is not an entity becomes &amp;
            if b == b'&' && !Self::is_valid_entity_start(&self.buffer[i..n]) {
                self.out_buffer.extend_from_slice(b"&amp;");
                continue;
            }
            self.out_buffer.push(b);
        }

        self.pos = 0;
        self.filled = self.out_buffer.len();
        Ok(())
    }

    /// Check if bytes starting with & look like a valid XML entity
    fn is_valid_entity_start(bytes: &[u8]) -> bool {
        if bytes.len() < 2 {
            return false;
        }
        if bytes[1] == b'#' {
            return true; // Assume numeric entities are valid
        }
        let mut end = 1;
        while end < bytes.len() && end < 10 {
            match bytes[end] {
                b';' => return end > 1,
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' => end += 1,
                _ => return false,
            }
        }
        false
    }
}

impl<R: Read> Read for SanitizingBufReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pos >= self.filled {
            self.refill_buffer()?;
            if self.filled == 0 {
                return Ok(0); // EOF
            }
        }

        let available = self.filled - self.pos;
        let to_copy = available.min(buf.len());
        buf[..to_copy].copy_from_slice(&self.out_buffer[self.pos..self.pos + to_copy]);
        self.pos += to_copy;
        Ok(to_copy)
    }
}

impl<R: Read> BufRead for SanitizingBufReader<R> {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        if self.pos >= self.filled {
            self.refill_buffer()?;
        }
        Ok(&self.out_buffer[self.pos..self.filled])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.filled);
    }
}

/// Decode XML entities back to normal characters
fn decode_xml_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut result = s
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ");

    // Numeric entities, decimal or hex
    let mut search_from = 0;
    while let Some(rel) = result[search_from..].find("&#") {
        let start = search_from + rel;
        let Some(end) = result[start..].find(';') else {
            break;
        };
        let entity = result[start..start + end + 1].to_string();
        let num_str = &entity[2..entity.len() - 1];
        let decoded = match num_str.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => num_str.parse::<u32>().ok(),
        };
        match decoded.and_then(char::from_u32) {
            Some(c) => {
                result.replace_range(start..start + end + 1, &c.to_string());
                search_from = start + c.len_utf8();
            }
            None => search_from = start + 2,
        }
    }

    // Last, so "&amp;lt;" stays "&lt;"
    result.replace("&amp;", "&")
}

/// Get attribute value from XML element
fn get_attribute(e: &quick_xml::events::BytesStart, name: &[u8]) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == name {
            let raw = String::from_utf8(attr.value.as_ref().to_vec()).ok()?;
            return Some(decode_xml_entities(&raw));
        }
    }
    None
}
