#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Identifier(String),
    Number(String),
    Text(String),
    Guid(String),
    LeftBrace,
    RightBrace,
    Semicolon,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::Identifier(value) => format!("identifier `{}`", value),
            Token::Number(value) => format!("number `{}`", value),
            Token::Text(value) => format!("string {:?}", value),
            Token::Guid(value) => format!("guid {}", value),
            Token::LeftBrace => "`{`".to_owned(),
            Token::RightBrace => "`}`".to_owned(),
            Token::Semicolon => "`;`".to_owned(),
        }
    }
}

/// Splits the text form of a .x file into tokens. Commas and stray symbols are dropped.
pub(crate) fn tokenize(text: &str) -> Vec<Token> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;
    while pos < chars.len() {
        let c = chars[pos];
        let next = chars.get(pos + 1).copied();
        match c {
            _ if c.is_whitespace() => pos += 1,
            '/' if next == Some('/') => {
                while pos < chars.len() && chars[pos] != '\n' {
                    pos += 1;
                }
            }
            '#' => {
                while pos < chars.len() && chars[pos] != '\n' {
                    pos += 1;
                }
            }
            '/' if next == Some('*') => {
                pos += 2;
                while pos < chars.len() && !(chars[pos] == '*' && chars.get(pos + 1) == Some(&'/'))
                {
                    pos += 1;
                }
                pos = (pos + 2).min(chars.len());
            }
            '{' => {
                tokens.push(Token::LeftBrace);
                pos += 1;
            }
            '}' => {
                tokens.push(Token::RightBrace);
                pos += 1;
            }
            ';' => {
                tokens.push(Token::Semicolon);
                pos += 1;
            }
            '<' => {
                let start = pos;
                while pos < chars.len() && chars[pos] != '>' {
                    pos += 1;
                }
                if pos >= chars.len() {
                    break;
                }
                pos += 1;
                tokens.push(Token::Guid(chars[start..pos].iter().collect()));
            }
            '"' => {
                let start = pos + 1;
                pos = start;
                while pos < chars.len() && chars[pos] != '"' {
                    pos += 1;
                }
                tokens.push(Token::Text(chars[start..pos].iter().collect()));
                pos = (pos + 1).min(chars.len());
            }
            _ if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => {
                let start = pos;
                pos += 1;
                while pos < chars.len() && is_number_char(chars[pos], chars[pos - 1]) {
                    pos += 1;
                }
                tokens.push(Token::Number(chars[start..pos].iter().collect()));
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = pos;
                while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                    pos += 1;
                }
                tokens.push(Token::Identifier(chars[start..pos].iter().collect()));
            }
            _ => pos += 1,
        }
    }
    tokens
}

fn is_number_char(c: char, previous: char) -> bool {
    c.is_ascii_digit()
        || c == '.'
        || matches!(c, 'e' | 'E')
        || (matches!(c, '-' | '+') && matches!(previous, 'e' | 'E'))
}

#[test]
fn test_tokenize() {
    let tokens = tokenize(
        "xof 0303txt 0032\n// comment\ntemplate Header {\n <3D82AB43-62DA-11cf-AB39-0020AF71E433>\n WORD major; /* skipped */ }\nHeader{1;0;1;}\nTextureFilename { \"tex.png\"; }\nMesh { 1; -1.5e-1;2,3;; }",
    );
    assert_eq!(Token::Identifier("xof".to_owned()), tokens[0]);
    assert_eq!(Token::Number("0303".to_owned()), tokens[1]);
    assert_eq!(Token::Identifier("txt".to_owned()), tokens[2]);
    assert_eq!(Token::Number("0032".to_owned()), tokens[3]);
    assert_eq!(Token::Identifier("template".to_owned()), tokens[4]);
    assert_eq!(
        Token::Guid("<3D82AB43-62DA-11cf-AB39-0020AF71E433>".to_owned()),
        tokens[7]
    );
    assert!(tokens.contains(&Token::Text("tex.png".to_owned())));
    assert!(tokens.contains(&Token::Number("-1.5e-1".to_owned())));
    assert!(!tokens.contains(&Token::Identifier("skipped".to_owned())));
    assert!(!tokens.contains(&Token::Identifier("comment".to_owned())));
    assert_eq!(Some(&Token::RightBrace), tokens.last());
}
