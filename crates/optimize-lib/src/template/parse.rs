//! Lexer and parser for the `{{ ... }}` template syntax

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    /// `.A.B`; an empty chain is the dot itself
    Field(Vec<String>),
    /// `$` or `$.A.B`
    Root(Vec<String>),
    Ident(String),
    Literal(Value),
    Pipe,
    LParen,
    RParen,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Arg {
    Field(Vec<String>),
    Root(Vec<String>),
    Func(String),
    Literal(Value),
    Pipe(Pipeline),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Command {
    pub args: Vec<Arg>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Pipeline {
    pub cmds: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Branch {
    pub pipe: Pipeline,
    pub list: Vec<Node>,
    pub else_list: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Action(Pipeline),
    If(Branch),
    Range(Branch),
    With(Branch),
}

enum Item {
    Text(String),
    Action { tokens: Vec<Token>, line: usize },
}

enum Stop {
    End,
    Else(Vec<Token>, usize),
    Eof,
}

/// Parse template text into a node list, rejecting unknown functions
pub(crate) fn parse(text: &str, is_func: &dyn Fn(&str) -> bool) -> Result<Vec<Node>, String> {
    let items = lex(text)?;
    let mut parser = Parser {
        items: items.into_iter(),
        is_func,
        line: 1,
    };
    match parser.parse_list()? {
        (nodes, Stop::Eof) => Ok(nodes),
        (_, Stop::End) => Err(format!("{}: unexpected {{{{end}}}}", parser.line)),
        (_, Stop::Else(_, line)) => Err(format!("{line}: unexpected {{{{else}}}}")),
    }
}

fn lex(text: &str) -> Result<Vec<Item>, String> {
    let mut items = Vec::new();
    let mut rest = text;
    let mut line = 1;
    let mut trim_next = false;

    while let Some(start) = rest.find("{{") {
        let after_open = &rest[start + 2..];
        let trim_left = after_open.starts_with('-')
            && after_open[1..].starts_with(|c: char| c.is_ascii_whitespace());

        let mut before = &rest[..start];
        if trim_next {
            before = before.trim_start();
        }
        if trim_left {
            before = before.trim_end();
        }
        if !before.is_empty() {
            items.push(Item::Text(before.to_string()));
        }
        line += rest[..start].matches('\n').count();

        let end = find_action_end(after_open).ok_or_else(|| format!("{line}: unclosed action"))?;
        let mut body = &after_open[usize::from(trim_left)..end];
        trim_next = false;
        if let Some(stripped) = body.strip_suffix('-') {
            if stripped.ends_with(|c: char| c.is_ascii_whitespace()) {
                body = stripped;
                trim_next = true;
            }
        }

        let trimmed = body.trim();
        if !(trimmed.starts_with("/*") && trimmed.ends_with("*/")) {
            let tokens = tokenize(body).map_err(|e| format!("{line}: {e}"))?;
            if tokens.is_empty() {
                return Err(format!("{line}: missing value for command"));
            }
            items.push(Item::Action { tokens, line });
        }

        line += after_open[..end].matches('\n').count();
        rest = &after_open[end + 2..];
    }

    let tail = if trim_next { rest.trim_start() } else { rest };
    if !tail.is_empty() {
        items.push(Item::Text(tail.to_string()));
    }
    Ok(items)
}

/// Offset of the closing `}}`, skipping over quoted strings
fn find_action_end(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'`' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'`' {
                    i += 1;
                }
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

fn tokenize(body: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = body.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            _ if c.is_whitespace() => i += 1,
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '"' => {
                let mut s = String::new();
                i += 1;
                loop {
                    let Some(&c) = chars.get(i) else {
                        return Err("unterminated quoted string".to_string());
                    };
                    i += 1;
                    match c {
                        '"' => break,
                        '\\' => {
                            let escaped = chars
                                .get(i)
                                .ok_or_else(|| "unterminated quoted string".to_string())?;
                            i += 1;
                            s.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                'r' => '\r',
                                other => *other,
                            });
                        }
                        other => s.push(other),
                    }
                }
                tokens.push(Token::Literal(Value::String(s)));
            }
            '`' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|&c| c == '`')
                    .ok_or_else(|| "unterminated raw quoted string".to_string())?;
                let s: String = chars[i + 1..i + 1 + close].iter().collect();
                tokens.push(Token::Literal(Value::String(s)));
                i += close + 2;
            }
            '.' | '$' => {
                let root = c == '$';
                i += 1;
                let mut chain = Vec::new();
                if root && chars.get(i) != Some(&'.') {
                    if chars.get(i).is_some_and(|c| is_ident_char(*c)) {
                        return Err("template variables are not supported".to_string());
                    }
                }
                if root && chars.get(i) == Some(&'.') {
                    i += 1;
                }
                loop {
                    let start = i;
                    while chars.get(i).is_some_and(|c| is_ident_char(*c)) {
                        i += 1;
                    }
                    if start == i {
                        break;
                    }
                    chain.push(chars[start..i].iter().collect());
                    if chars.get(i) == Some(&'.') {
                        i += 1;
                    } else {
                        break;
                    }
                }
                tokens.push(if root {
                    Token::Root(chain)
                } else {
                    Token::Field(chain)
                });
            }
            _ if c.is_ascii_digit()
                || ((c == '-' || c == '+') && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                while let Some(&d) = chars.get(i) {
                    let exponent_sign =
                        (d == '-' || d == '+') && matches!(chars[i - 1], 'e' | 'E');
                    if d.is_ascii_alphanumeric() || d == '.' || exponent_sign {
                        i += 1;
                    } else {
                        break;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token::Literal(parse_number(&text)?));
            }
            _ if is_ident_char(c) => {
                let start = i;
                while chars.get(i).is_some_and(|c| is_ident_char(*c)) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::Literal(Value::Bool(true)),
                    "false" => Token::Literal(Value::Bool(false)),
                    "nil" => Token::Literal(Value::Null),
                    _ => Token::Ident(word),
                });
            }
            other => return Err(format!("unexpected {other:?} in command")),
        }
    }
    Ok(tokens)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn parse_number(text: &str) -> Result<Value, String> {
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Value::from(i));
    }
    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| format!("bad number syntax: {text:?}"))
}

struct Parser<'f> {
    items: std::vec::IntoIter<Item>,
    is_func: &'f dyn Fn(&str) -> bool,
    line: usize,
}

impl Parser<'_> {
    fn parse_list(&mut self) -> Result<(Vec<Node>, Stop), String> {
        let mut nodes = Vec::new();
        while let Some(item) = self.items.next() {
            let (tokens, line) = match item {
                Item::Text(text) => {
                    nodes.push(Node::Text(text));
                    continue;
                }
                Item::Action { tokens, line } => (tokens, line),
            };
            self.line = line;

            match tokens.first() {
                Some(Token::Ident(word)) if word == "end" => {
                    if tokens.len() > 1 {
                        return Err(format!("{line}: unexpected arguments to end"));
                    }
                    return Ok((nodes, Stop::End));
                }
                Some(Token::Ident(word)) if word == "else" => {
                    return Ok((nodes, Stop::Else(tokens[1..].to_vec(), line)));
                }
                Some(Token::Ident(word)) if matches!(word.as_str(), "if" | "range" | "with") => {
                    let keyword = word.clone();
                    let node = self.parse_branch(&keyword, &tokens[1..], line)?;
                    nodes.push(node);
                }
                Some(Token::Ident(word))
                    if matches!(word.as_str(), "define" | "template" | "block") =>
                {
                    return Err(format!("{line}: {word} is not supported"));
                }
                _ => nodes.push(Node::Action(self.parse_pipeline(&tokens, line)?)),
            }
        }
        Ok((nodes, Stop::Eof))
    }

    fn parse_branch(&mut self, keyword: &str, tokens: &[Token], line: usize) -> Result<Node, String> {
        let pipe = self.parse_pipeline(tokens, line)?;
        let (list, stop) = self.parse_list()?;
        let else_list = match stop {
            Stop::End => Vec::new(),
            Stop::Else(rest, else_line) if rest.is_empty() => match self.parse_list()? {
                (else_list, Stop::End) => else_list,
                _ => return Err(format!("{else_line}: expected end; found EOF")),
            },
            Stop::Else(rest, else_line) => match rest.first() {
                // `else if` shares the closing end of the outer branch
                Some(Token::Ident(word)) if word == "if" || word == "with" => {
                    let word = word.clone();
                    vec![self.parse_branch(&word, &rest[1..], else_line)?]
                }
                _ => return Err(format!("{else_line}: unexpected arguments to else")),
            },
            Stop::Eof => return Err(format!("{line}: unexpected EOF in {keyword}")),
        };

        let branch = Branch {
            pipe,
            list,
            else_list,
        };
        Ok(match keyword {
            "if" => Node::If(branch),
            "range" => Node::Range(branch),
            _ => Node::With(branch),
        })
    }

    fn parse_pipeline(&self, tokens: &[Token], line: usize) -> Result<Pipeline, String> {
        let mut cmds = Vec::new();
        let mut args = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            match &tokens[i] {
                Token::Pipe => {
                    if args.is_empty() {
                        return Err(format!("{line}: missing command in pipeline"));
                    }
                    cmds.push(Command {
                        args: std::mem::take(&mut args),
                    });
                }
                Token::LParen => {
                    let close = matching_paren(tokens, i)
                        .ok_or_else(|| format!("{line}: unclosed left paren"))?;
                    args.push(Arg::Pipe(self.parse_pipeline(&tokens[i + 1..close], line)?));
                    i = close;
                }
                Token::RParen => return Err(format!("{line}: unexpected right paren")),
                Token::Field(chain) => args.push(Arg::Field(chain.clone())),
                Token::Root(chain) => args.push(Arg::Root(chain.clone())),
                Token::Literal(value) => args.push(Arg::Literal(value.clone())),
                Token::Ident(name) => {
                    if !(self.is_func)(name) {
                        return Err(format!("{line}: function {name:?} not defined"));
                    }
                    args.push(Arg::Func(name.clone()));
                }
            }
            i += 1;
        }
        if args.is_empty() {
            return Err(format!("{line}: missing value for command"));
        }
        cmds.push(Command { args });
        Ok(Pipeline { cmds })
    }
}

fn matching_paren(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(name: &str) -> bool {
        matches!(name, "lower" | "index")
    }

    #[test]
    fn test_tokenize_fields_and_literals() {
        let tokens = tokenize(r#" .Trial.Name "x" 42 -1.5 true `raw` $ "#).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Field(vec!["Trial".into(), "Name".into()]),
                Token::Literal(Value::from("x")),
                Token::Literal(Value::from(42)),
                Token::Literal(Value::from(-1.5)),
                Token::Literal(Value::Bool(true)),
                Token::Literal(Value::from("raw")),
                Token::Root(vec![]),
            ]
        );
    }

    #[test]
    fn test_trim_markers() {
        let nodes = parse("a  {{- .X -}}  b", &known).unwrap();
        assert_eq!(nodes[0], Node::Text("a".into()));
        assert_eq!(nodes[2], Node::Text("b".into()));
    }

    #[test]
    fn test_negative_number_is_not_trim_marker() {
        let nodes = parse("{{-3}}", &known).unwrap();
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn test_comments_are_dropped() {
        let nodes = parse("a{{/* note */}}b", &known).unwrap();
        assert_eq!(nodes, vec![Node::Text("a".into()), Node::Text("b".into())]);
    }

    #[test]
    fn test_else_if_chain() {
        let nodes = parse("{{if .A}}a{{else if .B}}b{{else}}c{{end}}", &known).unwrap();
        let Node::If(branch) = &nodes[0] else {
            panic!("expected if");
        };
        assert!(matches!(branch.else_list[0], Node::If(_)));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("{{ .A", &known).is_err());
        assert!(parse("{{ end }}", &known).is_err());
        assert!(parse("{{ if .A }}", &known).is_err());
        assert!(parse("{{ nope .A }}", &known)
            .unwrap_err()
            .contains("function \"nope\" not defined"));
        assert!(parse("{{ (lower .A }}", &known).is_err());
        assert!(parse("{{ .A | }}", &known).is_err());
    }
}
