//! Template wire URLs.
//!
//! A template link is any http(s) URL whose fragment is a query string:
//!
//! ```text
//! https://pxls.space/#x=500&y=500&scale=5&template=<image>&ox=480&oy=470&tw=40&title=Flag
//! ```
//!
//! `template`, `tw`, `ox` and `oy` are required. The remaining keys only
//! matter when a link is shared.

use std::fmt::Write as _;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Zoom written into generated links when none is set.
pub const DEFAULT_SCALE: f64 = 5.0;

/// Keys a link must carry.
pub const REQUIRED_KEYS: [&str; 4] = ["template", "tw", "ox", "oy"];

/// Error parsing a template link.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum LinkError {
    #[error("not an http(s) URL")]
    NotHttp,
    #[error("missing '{0}' parameter")]
    MissingField(&'static str),
    #[error("invalid '{field}' value '{value}'")]
    InvalidNumber { field: &'static str, value: String },
}

/// The parameters of a template link.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateLink {
    /// Everything before the `#`
    pub base: String,
    /// URL of the stylized template image
    pub image_url: String,
    /// Width of the template in canvas pixels
    pub true_width: u32,
    pub ox: i64,
    pub oy: i64,
    pub title: Option<String>,
    pub x: Option<i64>,
    pub y: Option<i64>,
    pub scale: Option<f64>,
    /// Template overlay opacity (`oo`)
    pub opacity: Option<f64>,
}

impl TemplateLink {
    pub fn new(base: impl Into<String>, image_url: impl Into<String>, true_width: u32, ox: i64, oy: i64) -> Self {
        Self {
            base: base.into(),
            image_url: image_url.into(),
            true_width,
            ox,
            oy,
            title: None,
            x: None,
            y: None,
            scale: None,
            opacity: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        let title = title.into();
        self.title = (!title.is_empty()).then_some(title);
        self
    }

    pub fn with_center(mut self, x: i64, y: i64) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Parse a template link.
    pub fn parse(url: &str) -> Result<Self, LinkError> {
        let url = url.trim();
        if !url.contains("http") || !url.contains("://") {
            return Err(LinkError::NotHttp);
        }
        let (base, fragment) = url.split_once('#').unwrap_or((url, ""));
        let params = parse_query(fragment);
        let get = |key: &str| params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());

        let mut required = [""; 4];
        for (slot, key) in required.iter_mut().zip(REQUIRED_KEYS) {
            *slot = get(key).ok_or(LinkError::MissingField(key))?;
        }
        let [image_url, tw, ox, oy] = required;

        Ok(Self {
            base: base.to_string(),
            image_url: image_url.to_string(),
            true_width: parse_number("tw", tw)?,
            ox: parse_number("ox", ox)?,
            oy: parse_number("oy", oy)?,
            title: get("title").map(str::to_string),
            x: get("x").and_then(|v| v.parse().ok()),
            y: get("y").and_then(|v| v.parse().ok()),
            scale: get("scale").and_then(|v| v.parse().ok()),
            opacity: get("oo").and_then(|v| v.parse().ok()),
        })
    }

    /// Render the link. `x`/`y` default to the offset when unset.
    pub fn to_url(&self) -> String {
        let mut url = format!(
            "{}#x={}&y={}&scale={}&template={}&ox={}&oy={}&tw={}",
            self.base,
            self.x.unwrap_or(self.ox),
            self.y.unwrap_or(self.oy),
            self.scale.unwrap_or(DEFAULT_SCALE),
            percent_encode(&self.image_url),
            self.ox,
            self.oy,
            self.true_width,
        );
        if let Some(oo) = self.opacity {
            let _ = write!(url, "&oo={}", oo);
        }
        if let Some(title) = &self.title {
            let _ = write!(url, "&title={}", percent_encode(title));
        }
        url
    }
}

impl std::fmt::Display for TemplateLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_url())
    }
}

fn parse_number<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, LinkError> {
    value
        .trim()
        .parse()
        .map_err(|_| LinkError::InvalidNumber { field, value: value.to_string() })
}

/// Split a query string into decoded pairs.
///
/// Pairs without `=` and pairs with an empty value are dropped. Repeated
/// keys are kept in order, so the first occurrence wins on lookup.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| (percent_decode(k), percent_decode(v)))
        .collect()
}

/// Percent-encode everything except unreserved characters.
pub fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            let _ = write!(out, "%{:02X}", b);
        }
    }
    out
}

/// Decode `%XX` escapes and `+`. Malformed escapes are kept as-is.
pub fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .filter(|h| h.iter().all(u8::is_ascii_hexdigit))
                    .and_then(|h| std::str::from_utf8(h).ok());
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(v) => {
                        out.push(v);
                        i += 2;
                    }
                    None => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn integer_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d+").ok()).as_ref()
}

/// Extract canvas coordinates from `"x y"` text or a pxls link.
///
/// A link's `x`/`y` fragment keys are used when present; otherwise the first
/// two integers in the text.
pub fn parse_coords(text: &str) -> Option<(i64, i64)> {
    if let Some((_, fragment)) = text.split_once('#') {
        let params = parse_query(fragment);
        let get = |key: &str| {
            params.iter().find(|(k, _)| k == key).and_then(|(_, v)| v.parse::<f64>().ok())
        };
        if let (Some(x), Some(y)) = (get("x"), get("y")) {
            return Some((x.floor() as i64, y.floor() as i64));
        }
    }
    let mut numbers = integer_re()?.find_iter(text).filter_map(|m| m.as_str().parse().ok());
    Some((numbers.next()?, numbers.next()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINK: &str = "https://pxls.space/#x=520&y=490&scale=5&template=https%3A%2F%2Fi.imgur.com%2Fabc.png&ox=500&oy=480&tw=40&title=My+Flag%21";

    #[test]
    fn test_parse_link() {
        let link = TemplateLink::parse(LINK).unwrap();
        assert_eq!(link.base, "https://pxls.space/");
        assert_eq!(link.image_url, "https://i.imgur.com/abc.png");
        assert_eq!(link.true_width, 40);
        assert_eq!((link.ox, link.oy), (500, 480));
        assert_eq!((link.x, link.y), (Some(520), Some(490)));
        assert_eq!(link.scale, Some(5.0));
        assert_eq!(link.title.as_deref(), Some("My Flag!"));
        assert_eq!(link.opacity, None);
    }

    #[test]
    fn test_parse_requires_http_and_keys() {
        assert_eq!(TemplateLink::parse("pxls.space/#template=a&tw=1&ox=0&oy=0"), Err(LinkError::NotHttp));
        assert_eq!(
            TemplateLink::parse("https://pxls.space/#template=a&ox=0&oy=0"),
            Err(LinkError::MissingField("tw"))
        );
        // empty values count as missing
        assert_eq!(
            TemplateLink::parse("https://pxls.space/#template=&tw=1&ox=0&oy=0"),
            Err(LinkError::MissingField("template"))
        );
        assert!(matches!(
            TemplateLink::parse("https://pxls.space/#template=a&tw=wide&ox=0&oy=0"),
            Err(LinkError::InvalidNumber { field: "tw", .. })
        ));
    }

    #[test]
    fn test_first_value_wins() {
        let link = TemplateLink::parse("https://x.y/#template=a&tw=3&tw=9&ox=-1&oy=2&ox=7").unwrap();
        assert_eq!(link.true_width, 3);
        assert_eq!(link.ox, -1);
    }

    #[test]
    fn test_to_url_round_trip() {
        let link = TemplateLink::new("https://pxls.space/", "https://cdn.example/t.png?x=1", 12, -3, 7)
            .with_title("Ünïcode & co")
            .with_center(3, 12);
        let url = link.to_url();
        assert!(url.starts_with("https://pxls.space/#x=3&y=12&scale=5&template=https%3A%2F%2Fcdn.example%2Ft.png%3Fx%3D1&ox=-3&oy=7&tw=12&title="));
        assert_eq!(TemplateLink::parse(&url).unwrap().title.as_deref(), Some("Ünïcode & co"));
        assert_eq!(TemplateLink::parse(&url).unwrap().image_url, link.image_url);
    }

    #[test]
    fn test_percent_decode_malformed() {
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz%41"), "%zzA");
        assert_eq!(percent_decode("a+b%20c"), "a b c");
        // signs are not hex digits
        assert_eq!(percent_decode("%+1"), "% 1");
        assert_eq!(percent_decode("%-1x"), "%-1x");
        assert_eq!(percent_decode("%4a"), "J");
    }

    #[test]
    fn test_parse_coords() {
        assert_eq!(parse_coords("12 -34"), Some((12, -34)));
        assert_eq!(parse_coords("(100, 200)"), Some((100, 200)));
        assert_eq!(parse_coords("https://pxls.space/#x=15&y=30&scale=20"), Some((15, 30)));
        assert_eq!(parse_coords("only 1"), None);
    }
}
