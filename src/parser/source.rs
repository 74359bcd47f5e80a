//! Lexical details recovered from the raw input.
//!
//! roxmltree resolves names to `{uri}local` pairs, drops the XML
//! declaration and folds CDATA sections into the surrounding text. The
//! object layer keeps all three, so they are read back from the source
//! ranges roxmltree reports.

/// The pseudo-attributes of an `<?xml ...?>` declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct XmlDecl {
    pub(crate) version: Option<String>,
    pub(crate) encoding: Option<String>,
    pub(crate) standalone: Option<bool>,
}

/// Reads the XML declaration at the start of `text`, if there is one.
pub(crate) fn xml_declaration(text: &str) -> Option<XmlDecl> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let body = text.strip_prefix("<?xml")?;
    if !body.starts_with(|c: char| c.is_ascii_whitespace()) {
        return None;
    }
    let end = body.find("?>")?;
    let mut decl = XmlDecl::default();
    for (name, value) in pseudo_attributes(&body[..end]) {
        match name {
            "version" => decl.version = Some(value.to_string()),
            "encoding" => decl.encoding = Some(value.to_string()),
            "standalone" => decl.standalone = Some(value == "yes"),
            _ => {}
        }
    }
    Some(decl)
}

/// Splits `name="value"` pairs. Values are returned raw.
fn pseudo_attributes(mut rest: &str) -> Vec<(&str, &str)> {
    let mut pairs = Vec::new();
    loop {
        rest = rest.trim_start();
        let Some(eq) = rest.find('=') else {
            break;
        };
        let name = rest[..eq].trim_end();
        let after = rest[eq + 1..].trim_start();
        let Some(quote) = after.chars().next().filter(|&c| c == '"' || c == '\'') else {
            break;
        };
        let Some(close) = after[1..].find(quote) else {
            break;
        };
        pairs.push((name, &after[1..=close]));
        rest = &after[close + 2..];
    }
    pairs
}

/// The names written in an element's start tag.
#[derive(Debug, Default)]
pub(crate) struct StartTag<'a> {
    pub(crate) qname: &'a str,
    pub(crate) attributes: Vec<&'a str>,
}

impl<'a> StartTag<'a> {
    /// The prefixes declared by `xmlns` attributes, `None` for the default
    /// namespace, in source order.
    pub(crate) fn declarations(&self) -> impl Iterator<Item = Option<&'a str>> + '_ {
        self.attributes.iter().filter_map(|&name| match name {
            "xmlns" => Some(None),
            other => other.strip_prefix("xmlns:").map(Some),
        })
    }

    /// The prefix written for the attribute with local name `local`
    /// resolving through `resolve` to `uri`.
    pub(crate) fn attribute_prefix<'r>(
        &self,
        local: &str,
        uri: &str,
        resolve: impl Fn(&'a str) -> Option<&'r str>,
    ) -> Option<&'a str> {
        self.attributes.iter().find_map(|&name| {
            let (prefix, rest) = name.split_once(':')?;
            (prefix != "xmlns" && rest == local && resolve(prefix) == Some(uri)).then_some(prefix)
        })
    }
}

/// Scans the start tag beginning at `text[0] == '<'`.
pub(crate) fn start_tag(text: &str) -> StartTag<'_> {
    let is_delim = |c: char| c.is_ascii_whitespace() || c == '/' || c == '>' || c == '=';
    let body = text.strip_prefix('<').unwrap_or(text);
    let qname_end = body.find(is_delim).unwrap_or(body.len());
    let mut tag = StartTag {
        qname: &body[..qname_end],
        attributes: Vec::new(),
    };
    let mut rest = &body[qname_end..];
    loop {
        rest = rest.trim_start();
        if rest.is_empty() || rest.starts_with('/') || rest.starts_with('>') {
            break;
        }
        let name_end = rest.find(is_delim).unwrap_or(rest.len());
        let name = &rest[..name_end];
        let after = rest[name_end..].trim_start();
        let Some(after) = after.strip_prefix('=') else {
            break;
        };
        let after = after.trim_start();
        let Some(quote) = after.chars().next().filter(|&c| c == '"' || c == '\'') else {
            break;
        };
        let Some(close) = after[1..].find(quote) else {
            break;
        };
        tag.attributes.push(name);
        rest = &after[close + 2..];
    }
    tag
}

/// A run of character data as written in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Text(String),
    CData(String),
}

/// Splits raw character data into text and CDATA runs.
///
/// Returns `None` when the raw span uses a reference this scanner cannot
/// expand (an entity declared in a DTD); the caller then keeps the text
/// as one run.
pub(crate) fn segments(raw: &str) -> Option<Vec<Segment>> {
    let mut out = Vec::new();
    let mut rest = raw;
    while let Some(start) = rest.find("<![CDATA[") {
        if start > 0 {
            out.push(Segment::Text(unescape(&rest[..start])?));
        }
        let body = &rest[start + "<![CDATA[".len()..];
        let end = body.find("]]>")?;
        out.push(Segment::CData(normalize_newlines(&body[..end])));
        rest = &body[end + "]]>".len()..];
    }
    if !rest.is_empty() {
        out.push(Segment::Text(unescape(rest)?));
    }
    Some(out)
}

fn normalize_newlines(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n")
}

/// Expands the predefined entities and character references.
fn unescape(raw: &str) -> Option<String> {
    let raw = normalize_newlines(raw);
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw.as_str();
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after.find(';')?;
        let entity = &after[..semi];
        let ch = match entity {
            "lt" => '<',
            "gt" => '>',
            "amp" => '&',
            "apos" => '\'',
            "quot" => '"',
            _ => {
                let code = if let Some(hex) = entity.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()?
                } else {
                    entity.strip_prefix('#')?.parse().ok()?
                };
                char::from_u32(code)?
            }
        };
        out.push(ch);
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    Some(out)
}
