//! USDA (ASCII) file parser.
//!
//! The text is split into tokens first and then parsed by recursive
//! descent into a `LayerSpec`. Values stay untyped (`RawValue`) here; the
//! loader types them from the declared attribute type.
//!
//! # Supported Syntax
//!
//! - `#usda 1.0` header and `( upAxis = "Z" metersPerUnit = 0.01 )` layer metadata
//! - `def Xform "Name" ( kind = "component" active = false ) { ... }`
//! - `over "Name" { ... }` and `class` prims
//! - `[custom] [uniform] <type>[[]] <name> [= <value>] [( ... )]`
//! - `<type> <name>.timeSamples = { 0: <value>, 10: <value> }`
//! - `rel <name> = </Path>` and `rel <name> = [</A>, </B>]`
//! - `variantSet "name" = { ... }` blocks are skipped

use thiserror::Error;

use super::types::*;

/// Errors that can occur during USDA parsing.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Unexpected end of file")]
    UnexpectedEof,

    #[error("Invalid number format: {0}")]
    InvalidNumber(String),

    #[error("Unclosed block starting at line {0}")]
    UnclosedBlock(usize),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Number(String),
    Str(String),
    Path(String),
    Asset(String),
    Punct(char),
}

/// List-op and qualifier keywords that carry no meaning for us.
const QUALIFIERS: &[&str] = &[
    "custom", "uniform", "varying", "config", "prepend", "append", "delete", "add", "reorder",
];

/// Split USDA text into tokens, tracking line numbers.
fn tokenize(content: &str) -> ParseResult<Vec<(usize, Token)>> {
    let chars: Vec<char> = content.chars().collect();
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\n' => {
                line += 1;
                i += 1;
            }
            c if c.is_whitespace() => i += 1,
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '"' | '\'' => {
                let start_line = line;
                let triple = i + 2 < chars.len() && chars[i + 1] == c && chars[i + 2] == c;
                i += if triple { 3 } else { 1 };
                let mut text = String::new();
                loop {
                    if i >= chars.len() {
                        return Err(ParseError::Parse {
                            line: start_line,
                            message: "Unterminated string".to_string(),
                        });
                    }
                    let ch = chars[i];
                    if ch == '\\' && i + 1 < chars.len() {
                        text.push(chars[i + 1]);
                        i += 2;
                        continue;
                    }
                    if ch == c {
                        if !triple {
                            i += 1;
                            break;
                        }
                        if i + 2 < chars.len() && chars[i + 1] == c && chars[i + 2] == c {
                            i += 3;
                            break;
                        }
                    }
                    if ch == '\n' {
                        line += 1;
                    }
                    text.push(ch);
                    i += 1;
                }
                tokens.push((start_line, Token::Str(text)));
            }
            '<' | '@' => {
                let close = if c == '<' { '>' } else { '@' };
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&ch| ch == close || ch == '\n')
                    .map(|offset| start + offset)
                    .filter(|&end| chars[end] == close)
                    .ok_or_else(|| ParseError::Parse {
                        line,
                        message: format!("Unterminated '{}'", c),
                    })?;
                let text: String = chars[start..end].iter().collect();
                tokens.push((line, if c == '<' { Token::Path(text) } else { Token::Asset(text) }));
                i = end + 1;
            }
            '(' | ')' | '[' | ']' | '{' | '}' | '=' | ',' | ':' | ';' => {
                tokens.push((line, Token::Punct(c)));
                i += 1;
            }
            c if c.is_ascii_digit()
                || ((c == '-' || c == '+' || c == '.')
                    && chars.get(i + 1).map_or(false, |n| n.is_ascii_digit() || *n == '.')) =>
            {
                let start = i;
                i += 1;
                while i < chars.len() {
                    let ch = chars[i];
                    let exponent_sign =
                        (ch == '-' || ch == '+') && matches!(chars[i - 1], 'e' | 'E');
                    if ch.is_ascii_digit() || ch == '.' || ch == 'e' || ch == 'E' || exponent_sign {
                        i += 1;
                    } else {
                        break;
                    }
                }
                tokens.push((line, Token::Number(chars[start..i].iter().collect())));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '_' | ':' | '.'))
                {
                    i += 1;
                }
                tokens.push((line, Token::Ident(chars[start..i].iter().collect())));
            }
            other => {
                return Err(ParseError::Parse {
                    line,
                    message: format!("Unexpected character '{}'", other),
                });
            }
        }
    }

    Ok(tokens)
}

/// USDA file parser.
pub struct UsdaParser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl UsdaParser {
    /// Create a new parser from file contents.
    pub fn new(content: &str) -> ParseResult<Self> {
        Ok(Self {
            tokens: tokenize(content)?,
            pos: 0,
        })
    }

    /// Parse the USDA content into a layer.
    pub fn parse(&mut self) -> ParseResult<LayerSpec> {
        let mut layer = LayerSpec::default();

        if self.peek_punct('(') {
            self.pos += 1;
            self.parse_layer_metadata(&mut layer.metadata)?;
        }

        while self.peek().is_some() {
            layer.prims.push(self.parse_prim()?);
        }

        Ok(layer)
    }

    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn peek_punct(&self, c: char) -> bool {
        self.peek() == Some(&Token::Punct(c))
    }

    fn peek_ident(&self) -> Option<&str> {
        match self.peek() {
            Some(Token::Ident(s)) => Some(s),
            _ => None,
        }
    }

    /// Line of the next token (or of the last token at end of input).
    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |(line, _)| *line)
    }

    fn next(&mut self) -> ParseResult<Token> {
        let token = self
            .tokens
            .get(self.pos)
            .map(|(_, t)| t.clone())
            .ok_or(ParseError::UnexpectedEof)?;
        self.pos += 1;
        Ok(token)
    }

    fn error<T>(&self, message: impl Into<String>) -> ParseResult<T> {
        Err(ParseError::Parse {
            line: self.line(),
            message: message.into(),
        })
    }

    fn expect_punct(&mut self, c: char) -> ParseResult<()> {
        let line = self.line();
        match self.next()? {
            Token::Punct(p) if p == c => Ok(()),
            other => Err(ParseError::Parse {
                line,
                message: format!("Expected '{}', found {:?}", c, other),
            }),
        }
    }

    fn expect_ident(&mut self) -> ParseResult<String> {
        let line = self.line();
        match self.next()? {
            Token::Ident(s) => Ok(s),
            other => Err(ParseError::Parse {
                line,
                message: format!("Expected identifier, found {:?}", other),
            }),
        }
    }

    fn skip_qualifiers(&mut self) {
        while let Some(ident) = self.peek_ident() {
            if QUALIFIERS.contains(&ident) {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    /// Skip a bracketed group whose opening token is next.
    fn skip_balanced(&mut self) -> ParseResult<()> {
        let start_line = self.line();
        let mut depth = 0usize;
        loop {
            let token = self.next().map_err(|_| ParseError::UnclosedBlock(start_line))?;
            match token {
                Token::Punct('(' | '[' | '{') => depth += 1,
                Token::Punct(')' | ']' | '}') => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ if depth == 0 => return Ok(()),
                _ => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // Grammar
    // ------------------------------------------------------------------

    /// Parse `( key = value ... )`; the opening paren is already consumed.
    fn parse_layer_metadata(&mut self, metadata: &mut LayerMetadata) -> ParseResult<()> {
        let start_line = self.line();
        loop {
            match self.peek() {
                None => return Err(ParseError::UnclosedBlock(start_line)),
                Some(Token::Punct(')')) => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(Token::Str(_)) | Some(Token::Punct(';')) => self.pos += 1,
                _ => {
                    self.skip_qualifiers();
                    let key = self.expect_ident()?;
                    self.expect_punct('=')?;
                    let value = self.parse_metadata_value()?;
                    match (key.as_str(), value) {
                        ("upAxis", RawValue::Str(s) | RawValue::Ident(s)) => {
                            metadata.up_axis = Some(s)
                        }
                        ("metersPerUnit", RawValue::Number(n)) => metadata.meters_per_unit = Some(n),
                        ("defaultPrim", RawValue::Str(s)) => metadata.default_prim = Some(s),
                        (key, _) => log::debug!("Ignoring layer metadata '{}'", key),
                    }
                }
            }
        }
    }

    /// Parse a prim: `def|over|class [Type] "Name" [( metadata )] { body }`.
    fn parse_prim(&mut self) -> ParseResult<PrimSpec> {
        let line = self.line();
        let specifier = match self.expect_ident()?.as_str() {
            "def" => Specifier::Def,
            "over" => Specifier::Over,
            "class" => Specifier::Class,
            other => return self.error(format!("Expected prim specifier, found '{}'", other)),
        };

        let type_name = match self.peek() {
            Some(Token::Ident(_)) => self.expect_ident()?,
            _ => String::new(),
        };

        let name = match self.next()? {
            Token::Str(name) => name,
            other => return self.error(format!("Expected prim name, found {:?}", other)),
        };

        let mut prim = PrimSpec {
            specifier,
            type_name,
            name,
            kind: None,
            active: None,
            properties: Vec::new(),
            children: Vec::new(),
            line,
        };

        if self.peek_punct('(') {
            self.pos += 1;
            self.parse_prim_metadata(&mut prim)?;
        }

        self.expect_punct('{')?;
        self.parse_prim_body(&mut prim)?;
        Ok(prim)
    }

    /// Parse prim metadata; the opening paren is already consumed.
    fn parse_prim_metadata(&mut self, prim: &mut PrimSpec) -> ParseResult<()> {
        loop {
            match self.peek() {
                None => return Err(ParseError::UnclosedBlock(prim.line)),
                Some(Token::Punct(')')) => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(Token::Str(_)) | Some(Token::Punct(';')) => self.pos += 1,
                _ => {
                    self.skip_qualifiers();
                    let key = self.expect_ident()?;
                    self.expect_punct('=')?;
                    let value = self.parse_metadata_value()?;
                    match (key.as_str(), value) {
                        ("kind", RawValue::Str(kind)) => prim.kind = Some(kind),
                        ("active", RawValue::Ident(flag)) => prim.active = Some(flag == "true"),
                        ("active", RawValue::Number(n)) => prim.active = Some(n != 0.0),
                        _ => {}
                    }
                }
            }
        }
    }

    /// Metadata values may be typed dictionaries, which are skipped.
    fn parse_metadata_value(&mut self) -> ParseResult<RawValue> {
        if self.peek_punct('{') {
            self.skip_balanced()?;
            return Ok(RawValue::Dict(Vec::new()));
        }
        self.parse_value()
    }

    /// Parse the prim body; the opening brace is already consumed.
    fn parse_prim_body(&mut self, prim: &mut PrimSpec) -> ParseResult<()> {
        loop {
            match self.peek() {
                None => return Err(ParseError::UnclosedBlock(prim.line)),
                Some(Token::Punct('}')) => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(Token::Punct(';')) => self.pos += 1,
                Some(Token::Ident(ident)) if matches!(ident.as_str(), "def" | "over" | "class") => {
                    let child = self.parse_prim()?;
                    prim.children.push(child);
                }
                Some(Token::Ident(ident)) if ident == "variantSet" => {
                    self.pos += 1;
                    self.next()?; // set name
                    self.expect_punct('=')?;
                    self.skip_balanced()?;
                    log::debug!("Skipping variantSet in prim {}", prim.name);
                }
                _ => {
                    if let Some(property) = self.parse_property()? {
                        prim.properties.push(property);
                    }
                }
            }
        }
    }

    /// Parse one attribute or relationship.
    ///
    /// Returns `None` for properties we read but do not keep (connections).
    fn parse_property(&mut self) -> ParseResult<Option<PropertySpec>> {
        self.skip_qualifiers();
        let line = self.line();

        let type_name = if self.peek_ident() == Some("rel") {
            self.pos += 1;
            "rel".to_string()
        } else {
            let mut type_name = self.expect_ident()?;
            if self.peek_punct('[') {
                self.pos += 1;
                self.expect_punct(']')?;
                type_name.push_str("[]");
            }
            type_name
        };

        let full_name = self.expect_ident()?;
        let mut property = PropertySpec {
            name: full_name.clone(),
            type_name,
            default: None,
            time_samples: Vec::new(),
            line,
        };
        let mut keep = true;

        if let Some(name) = full_name.strip_suffix(".timeSamples") {
            property.name = name.to_string();
            self.expect_punct('=')?;
            property.time_samples = self.parse_time_samples()?;
        } else if self.peek_punct('=') {
            self.pos += 1;
            let value = self.parse_value()?;
            if let Some(name) = full_name.strip_suffix(".connect") {
                log::debug!("Ignoring connection on {}", name);
                keep = false;
            } else {
                property.default = Some(value);
            }
        }

        if self.peek_punct('(') {
            self.skip_balanced()?;
        }

        Ok(keep.then_some(property))
    }

    /// Parse `{ time: value, ... }`.
    fn parse_time_samples(&mut self) -> ParseResult<Vec<(f64, RawValue)>> {
        let start_line = self.line();
        self.expect_punct('{')?;
        let mut samples = Vec::new();
        loop {
            match self.peek() {
                None => return Err(ParseError::UnclosedBlock(start_line)),
                Some(Token::Punct('}')) => {
                    self.pos += 1;
                    return Ok(samples);
                }
                Some(Token::Punct(',')) => self.pos += 1,
                _ => {
                    let time = match self.parse_value()? {
                        RawValue::Number(t) => t,
                        other => return self.error(format!("Expected time code, found {:?}", other)),
                    };
                    self.expect_punct(':')?;
                    samples.push((time, self.parse_value()?));
                }
            }
        }
    }

    /// Parse a value: number, string, identifier, path, asset, tuple, list or dict.
    fn parse_value(&mut self) -> ParseResult<RawValue> {
        let line = self.line();
        match self.next()? {
            Token::Number(text) => text
                .parse::<f64>()
                .map(RawValue::Number)
                .map_err(|_| ParseError::InvalidNumber(text)),
            Token::Str(s) => Ok(RawValue::Str(s)),
            Token::Ident(s) => Ok(RawValue::Ident(s)),
            Token::Path(p) => Ok(RawValue::Path(p)),
            Token::Asset(a) => Ok(RawValue::Asset(a)),
            Token::Punct('(') => Ok(RawValue::Tuple(self.parse_sequence(')', line)?)),
            Token::Punct('[') => Ok(RawValue::List(self.parse_sequence(']', line)?)),
            Token::Punct('{') => {
                let mut entries = Vec::new();
                loop {
                    match self.peek() {
                        None => return Err(ParseError::UnclosedBlock(line)),
                        Some(Token::Punct('}')) => {
                            self.pos += 1;
                            return Ok(RawValue::Dict(entries));
                        }
                        Some(Token::Punct(',')) => self.pos += 1,
                        _ => {
                            let key = self.parse_value()?;
                            self.expect_punct(':')?;
                            entries.push((key, self.parse_value()?));
                        }
                    }
                }
            }
            other => Err(ParseError::Parse {
                line,
                message: format!("Unexpected token {:?} in value", other),
            }),
        }
    }

    /// Parse comma-separated values up to `close` (trailing comma allowed).
    fn parse_sequence(&mut self, close: char, start_line: usize) -> ParseResult<Vec<RawValue>> {
        let mut items = Vec::new();
        loop {
            match self.peek() {
                None => return Err(ParseError::UnclosedBlock(start_line)),
                Some(Token::Punct(c)) if *c == close => {
                    self.pos += 1;
                    return Ok(items);
                }
                Some(Token::Punct(',')) => self.pos += 1,
                _ => items.push(self.parse_value()?),
            }
        }
    }
}

/// Parse a USDA string into a layer.
pub fn parse_usda(content: &str) -> ParseResult<LayerSpec> {
    let mut parser = UsdaParser::new(content)?;
    parser.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_mesh() {
        let usda = r#"#usda 1.0
def Mesh "Cube" {
    point3f[] points = [(0, 0, 0), (1, 0, 0), (1, 1, 0), (0, 1, 0)]
    int[] faceVertexCounts = [4]
    int[] faceVertexIndices = [0, 1, 2, 3]
}
"#;

        let layer = parse_usda(usda).unwrap();
        assert_eq!(layer.prims.len(), 1);

        let mesh = &layer.prims[0];
        assert_eq!(mesh.type_name, "Mesh");
        assert_eq!(mesh.name, "Cube");
        assert_eq!(mesh.properties.len(), 3);
        assert_eq!(mesh.properties[0].type_name, "point3f[]");
        match &mesh.properties[0].default {
            Some(RawValue::List(points)) => assert_eq!(points.len(), 4),
            other => panic!("Expected list, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_layer_metadata() {
        let usda = r#"#usda 1.0
(
    "Exported scene"
    defaultPrim = "World"
    metersPerUnit = 1
    upAxis = "Z"
    customLayerData = {
        string creator = "tool"
    }
)

def Xform "World" {}
"#;

        let layer = parse_usda(usda).unwrap();
        assert_eq!(layer.metadata.up_axis.as_deref(), Some("Z"));
        assert_eq!(layer.metadata.meters_per_unit, Some(1.0));
        assert_eq!(layer.metadata.default_prim.as_deref(), Some("World"));
        assert_eq!(layer.prims[0].name, "World");
    }

    #[test]
    fn test_parse_prim_metadata_and_children() {
        let usda = r#"
def Xform "Model" (
    kind = "component"
    active = false
    prepend apiSchemas = ["MaterialBindingAPI"]
)
{
    double3 xformOp:translate = (1, 2, 3)
    uniform token[] xformOpOrder = ["xformOp:translate"]

    def Mesh "Body" {
        rel material:binding = </Looks/Red>
    }
    over "Overridden" {}
}
"#;

        let layer = parse_usda(usda).unwrap();
        let model = &layer.prims[0];
        assert_eq!(model.kind.as_deref(), Some("component"));
        assert_eq!(model.active, Some(false));
        assert_eq!(model.children.len(), 2);
        assert_eq!(model.children[1].specifier, Specifier::Over);
        assert_eq!(model.children[1].type_name, "");

        let rel = &model.children[0].properties[0];
        assert_eq!(rel.type_name, "rel");
        assert_eq!(rel.default, Some(RawValue::Path("/Looks/Red".to_string())));
    }

    #[test]
    fn test_parse_time_samples() {
        let usda = r#"
def Xform "Anim" {
    double3 xformOp:translate.timeSamples = {
        0: (0, 0, 0),
        10: (10, 0, 0),
    }
}
"#;

        let layer = parse_usda(usda).unwrap();
        let property = &layer.prims[0].properties[0];
        assert_eq!(property.name, "xformOp:translate");
        assert_eq!(property.time_samples.len(), 2);
        assert_eq!(property.time_samples[1].0, 10.0);
    }

    #[test]
    fn test_attribute_metadata_and_connections_skipped() {
        let usda = r#"
def Mesh "M" {
    texCoord2f[] primvars:st = [(0, 0), (1, 0)] (
        interpolation = "faceVarying"
    )
    color3f inputs:diffuseColor.connect = </Mat/Tex.outputs:rgb>
    float radius = -1.5e-2
}
"#;

        let layer = parse_usda(usda).unwrap();
        let props = &layer.prims[0].properties;
        assert_eq!(props.len(), 2);
        assert_eq!(props[1].default, Some(RawValue::Number(-0.015)));
    }

    #[test]
    fn test_unclosed_block_reports_line() {
        let usda = "def Xform \"Broken\" {\n    double3 xformOp:translate = (1, 2, 3)\n";
        match parse_usda(usda) {
            Err(ParseError::UnclosedBlock(line)) => assert_eq!(line, 1),
            other => panic!("Expected UnclosedBlock, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_number() {
        let usda = "def Mesh \"M\" {\n    float a = 1.2.3\n}\n";
        assert!(matches!(parse_usda(usda), Err(ParseError::InvalidNumber(_))));
    }
}
