//! EmmyLua doc-comment parser
//!
//! Parses the body of `---@tag ...` lines into [`DocTag`] values. Type
//! expressions follow the EmmyLua grammar:
//!
//! - unions `A | B`, optionals `T?`, arrays `T[]`
//! - generic applications `Name<A, B>`
//! - functions `fun<T>(a: A, b?: B, ...: C): R1, R2...`
//! - shape tables `{ name: T, [K]: V }`
//! - string, number and boolean literal types
//!
//! Unknown tags are kept as [`DocTag::Other`] so callers can ignore them.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct DocGeneric {
    pub name: String,
    pub bound: Option<DocTy>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocParam {
    pub name: String,
    pub ty: DocTy,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocFun {
    pub generics: Vec<DocGeneric>,
    pub params: Vec<DocParam>,
    pub vararg: Option<Box<DocTy>>,
    pub returns: Option<Box<DocTy>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocFieldKey {
    Name(String),
    Indexer(DocTy),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocTableField {
    pub key: DocFieldKey,
    pub ty: DocTy,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocTy {
    Name { name: String, args: Vec<DocTy> },
    Array(Box<DocTy>),
    Union(Vec<DocTy>),
    Fun(DocFun),
    Table(Vec<DocTableField>),
    StringLiteral(String),
    NumberLiteral(String),
    BooleanLiteral(bool),
    /// Multiple results, only produced for return lists
    Multiple { list: Vec<DocTy>, variadic: bool },
}

impl DocTy {
    pub fn named(name: impl Into<String>) -> Self {
        DocTy::Name {
            name: name.into(),
            args: Vec::new(),
        }
    }

    fn optional(self) -> Self {
        match self {
            DocTy::Union(mut list) => {
                list.push(DocTy::named("nil"));
                DocTy::Union(list)
            }
            ty => DocTy::Union(vec![ty, DocTy::named("nil")]),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocTag {
    Class {
        name: String,
        generics: Vec<DocGeneric>,
        supers: Vec<DocTy>,
    },
    Field {
        visibility: Option<String>,
        key: DocFieldKey,
        ty: DocTy,
        optional: bool,
    },
    Type {
        tys: Vec<DocTy>,
    },
    Param {
        name: String,
        ty: DocTy,
        optional: bool,
    },
    Vararg {
        ty: DocTy,
    },
    Return {
        ty: DocTy,
    },
    Alias {
        name: String,
        generics: Vec<DocGeneric>,
        ty: DocTy,
    },
    Generic {
        params: Vec<DocGeneric>,
    },
    Overload {
        fun: DocFun,
    },
    Not {
        tys: Vec<DocTy>,
    },
    Other {
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocError {
    pub message: String,
}

impl fmt::Display for DocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for DocError {}

type DocResult<T> = Result<T, DocError>;

fn error<T>(message: impl Into<String>) -> DocResult<T> {
    Err(DocError {
        message: message.into(),
    })
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(String),
    Ellipsis,
    Punct(char),
}

fn tokenize(input: &str) -> Vec<Token> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '.' && chars.get(i + 1) == Some(&'.') && chars.get(i + 2) == Some(&'.') {
            tokens.push(Token::Ellipsis);
            i += 3;
        } else if c == '"' || c == '\'' || c == '`' {
            let start = i + 1;
            i += 1;
            while i < chars.len() && chars[i] != c {
                i += 1;
            }
            tokens.push(Token::Str(chars[start..i.min(chars.len())].iter().collect()));
            i += 1;
        } else if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) {
            let start = i;
            i += 1;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token::Number(chars[start..i].iter().collect()));
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len()
                && (chars[i].is_alphanumeric()
                    || chars[i] == '_'
                    || (chars[i] == '.' && chars.get(i + 1).is_some_and(|n| n.is_alphabetic() || *n == '_')))
            {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else {
            tokens.push(Token::Punct(c));
            i += 1;
        }
    }
    tokens
}

struct DocParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl DocParser {
    fn new(input: &str) -> Self {
        Self {
            tokens: tokenize(input),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_punct(&self, c: char) -> bool {
        self.peek() == Some(&Token::Punct(c))
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.at_punct(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, c: char) -> DocResult<()> {
        if self.eat_punct(c) {
            Ok(())
        } else {
            error(format!("expected '{}'", c))
        }
    }

    fn ident(&mut self) -> DocResult<String> {
        match self.bump() {
            Some(Token::Ident(name)) => Ok(name),
            Some(other) => error(format!("expected name, found {:?}", other)),
            None => error("expected name"),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// `T1 | T2 | ...`
    fn ty(&mut self) -> DocResult<DocTy> {
        let first = self.postfix()?;
        if !self.at_punct('|') {
            return Ok(first);
        }
        let mut list = vec![first];
        while self.eat_punct('|') {
            list.push(self.postfix()?);
        }
        Ok(DocTy::Union(list))
    }

    fn postfix(&mut self) -> DocResult<DocTy> {
        let mut ty = self.primary()?;
        loop {
            if self.at_punct('[') && self.peek_at(1) == Some(&Token::Punct(']')) {
                self.pos += 2;
                ty = DocTy::Array(Box::new(ty));
            } else if self.eat_punct('?') {
                ty = ty.optional();
            } else {
                return Ok(ty);
            }
        }
    }

    fn primary(&mut self) -> DocResult<DocTy> {
        match self.bump() {
            Some(Token::Ident(name)) if name == "fun" && (self.at_punct('(') || self.at_punct('<')) => {
                Ok(DocTy::Fun(self.fun()?))
            }
            Some(Token::Ident(name)) if name == "true" || name == "false" => {
                Ok(DocTy::BooleanLiteral(name == "true"))
            }
            Some(Token::Ident(name)) => {
                let mut args = Vec::new();
                if self.eat_punct('<') {
                    args.push(self.ty()?);
                    while self.eat_punct(',') {
                        args.push(self.ty()?);
                    }
                    self.expect_punct('>')?;
                }
                Ok(DocTy::Name { name, args })
            }
            Some(Token::Str(value)) => Ok(DocTy::StringLiteral(value)),
            Some(Token::Number(value)) => Ok(DocTy::NumberLiteral(value)),
            Some(Token::Punct('(')) => {
                let inner = self.return_list()?;
                self.expect_punct(')')?;
                Ok(inner)
            }
            Some(Token::Punct('{')) => self.table(),
            Some(other) => error(format!("unexpected {:?} in type", other)),
            None => error("expected type"),
        }
    }

    fn generics(&mut self) -> DocResult<Vec<DocGeneric>> {
        let mut generics = Vec::new();
        loop {
            let name = self.ident()?;
            let bound = if self.eat_punct(':') {
                Some(self.ty()?)
            } else {
                None
            };
            generics.push(DocGeneric { name, bound });
            if !self.eat_punct(',') {
                return Ok(generics);
            }
        }
    }

    /// After the `fun` keyword.
    fn fun(&mut self) -> DocResult<DocFun> {
        let generics = if self.eat_punct('<') {
            let generics = self.generics()?;
            self.expect_punct('>')?;
            generics
        } else {
            Vec::new()
        };
        self.expect_punct('(')?;
        let mut params = Vec::new();
        let mut vararg = None;
        while !self.at_punct(')') {
            if self.peek() == Some(&Token::Ellipsis) {
                self.pos += 1;
                let ty = if self.eat_punct(':') {
                    self.ty()?
                } else {
                    DocTy::named("any")
                };
                vararg = Some(Box::new(ty));
            } else {
                let name = self.ident()?;
                let optional = self.eat_punct('?');
                let ty = if self.eat_punct(':') {
                    self.ty()?
                } else {
                    DocTy::named("any")
                };
                params.push(DocParam { name, ty, optional });
            }
            if !self.eat_punct(',') {
                break;
            }
        }
        self.expect_punct(')')?;
        let returns = if self.eat_punct(':') {
            Some(Box::new(self.single_return()?))
        } else {
            None
        };
        Ok(DocFun {
            generics,
            params,
            vararg,
            returns,
        })
    }

    /// A return type nested inside another type: one type, optionally variadic.
    fn single_return(&mut self) -> DocResult<DocTy> {
        let ty = self.ty()?;
        if self.peek() == Some(&Token::Ellipsis) {
            self.pos += 1;
            return Ok(DocTy::Multiple {
                list: vec![ty],
                variadic: true,
            });
        }
        Ok(ty)
    }

    /// `T1, T2, T3...`
    fn return_list(&mut self) -> DocResult<DocTy> {
        let mut list = vec![self.ty()?];
        let mut variadic = false;
        loop {
            if self.peek() == Some(&Token::Ellipsis) {
                self.pos += 1;
                variadic = true;
                break;
            }
            // `@return number count the count`: skip the result name
            if let Some(Token::Ident(_)) = self.peek() {
                if self.peek_at(1) != Some(&Token::Punct('<')) {
                    self.pos += 1;
                }
            }
            if !self.eat_punct(',') {
                break;
            }
            list.push(self.ty()?);
        }
        if list.len() == 1 && !variadic {
            return Ok(list.remove(0));
        }
        Ok(DocTy::Multiple { list, variadic })
    }

    /// After `{`.
    fn table(&mut self) -> DocResult<DocTy> {
        let mut fields = Vec::new();
        while !self.at_punct('}') {
            let key = if self.eat_punct('[') {
                let key = self.ty()?;
                self.expect_punct(']')?;
                DocFieldKey::Indexer(key)
            } else {
                DocFieldKey::Name(self.ident()?)
            };
            let optional = self.eat_punct('?');
            self.expect_punct(':')?;
            let ty = self.ty()?;
            fields.push(DocTableField { key, ty, optional });
            if !self.eat_punct(',') && !self.eat_punct(';') {
                break;
            }
        }
        self.expect_punct('}')?;
        Ok(DocTy::Table(fields))
    }

    fn type_list(&mut self) -> DocResult<Vec<DocTy>> {
        let mut list = vec![self.ty()?];
        while self.eat_punct(',') {
            list.push(self.ty()?);
        }
        Ok(list)
    }

    fn tag(&mut self, name: &str) -> DocResult<DocTag> {
        match name {
            "class" => {
                let class = self.ident()?;
                let generics = if self.eat_punct('<') {
                    let generics = self.generics()?;
                    self.expect_punct('>')?;
                    generics
                } else {
                    Vec::new()
                };
                let mut supers = Vec::new();
                if self.eat_punct(':') {
                    supers.push(self.ty()?);
                    while self.eat_punct(',') {
                        supers.push(self.ty()?);
                    }
                }
                Ok(DocTag::Class {
                    name: class,
                    generics,
                    supers,
                })
            }
            "field" => {
                let mut visibility = None;
                if let Some(Token::Ident(word)) = self.peek() {
                    if matches!(word.as_str(), "public" | "protected" | "private" | "package")
                        && matches!(self.peek_at(1), Some(Token::Ident(_)) | Some(Token::Punct('[')))
                    {
                        visibility = Some(word.clone());
                        self.pos += 1;
                    }
                }
                let key = if self.eat_punct('[') {
                    let key = self.ty()?;
                    self.expect_punct(']')?;
                    DocFieldKey::Indexer(key)
                } else {
                    DocFieldKey::Name(self.ident()?)
                };
                let optional = self.eat_punct('?');
                let ty = self.ty()?;
                let ty = if optional { ty.optional() } else { ty };
                Ok(DocTag::Field {
                    visibility,
                    key,
                    ty,
                    optional,
                })
            }
            "type" => Ok(DocTag::Type {
                tys: self.type_list()?,
            }),
            "not" => Ok(DocTag::Not {
                tys: self.type_list()?,
            }),
            "param" => {
                if self.peek() == Some(&Token::Ellipsis) {
                    self.pos += 1;
                    return Ok(DocTag::Vararg { ty: self.ty()? });
                }
                let param = self.ident()?;
                let optional = self.eat_punct('?');
                let ty = self.ty()?;
                let ty = if optional { ty.optional() } else { ty };
                Ok(DocTag::Param {
                    name: param,
                    ty,
                    optional,
                })
            }
            "vararg" => Ok(DocTag::Vararg { ty: self.ty()? }),
            "return" => Ok(DocTag::Return {
                ty: self.return_list()?,
            }),
            "alias" => {
                let alias = self.ident()?;
                let generics = if self.eat_punct('<') {
                    let generics = self.generics()?;
                    self.expect_punct('>')?;
                    generics
                } else {
                    Vec::new()
                };
                // `---@alias Mode` followed by `---| "a"` lines
                let ty = if self.at_end() {
                    DocTy::Union(Vec::new())
                } else {
                    self.ty()?
                };
                Ok(DocTag::Alias {
                    name: alias,
                    generics,
                    ty,
                })
            }
            "generic" => Ok(DocTag::Generic {
                params: self.generics()?,
            }),
            "overload" => {
                let keyword = self.ident()?;
                if keyword != "fun" {
                    return error("expected 'fun' after @overload");
                }
                Ok(DocTag::Overload { fun: self.fun()? })
            }
            other => Ok(DocTag::Other {
                name: other.to_string(),
            }),
        }
    }
}

/// Parses the text after `---@`, e.g. `param name string`.
pub fn parse_tag(line: &str) -> Result<DocTag, DocError> {
    let line = line.trim();
    let (name, rest) = line
        .split_once(|c: char| c.is_whitespace())
        .unwrap_or((line, ""));
    let mut parser = DocParser::new(rest);
    parser.tag(name)
}

/// Parses a standalone type expression.
pub fn parse_type(text: &str) -> Result<DocTy, DocError> {
    let mut parser = DocParser::new(text);
    let ty = parser.ty()?;
    if !parser.at_end() {
        return error(format!("unexpected trailing input in '{}'", text.trim()));
    }
    Ok(ty)
}

/// Parses a `---| "value"` continuation line of an alias.
pub fn parse_alias_variant(line: &str) -> Result<DocTy, DocError> {
    let mut parser = DocParser::new(line);
    parser.postfix()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_types() {
        assert_eq!(parse_type("number").unwrap(), DocTy::named("number"));
        assert_eq!(
            parse_type("string[]").unwrap(),
            DocTy::Array(Box::new(DocTy::named("string")))
        );
        assert_eq!(
            parse_type("number|nil").unwrap(),
            DocTy::Union(vec![DocTy::named("number"), DocTy::named("nil")])
        );
        assert_eq!(parse_type("'a'").unwrap(), DocTy::StringLiteral("a".into()));
    }

    #[test]
    fn test_parse_optional_is_nil_union() {
        assert_eq!(
            parse_type("string?").unwrap(),
            DocTy::Union(vec![DocTy::named("string"), DocTy::named("nil")])
        );
    }

    #[test]
    fn test_parse_generic_application() {
        let ty = parse_type("table<string, number>").unwrap();
        assert_eq!(
            ty,
            DocTy::Name {
                name: "table".into(),
                args: vec![DocTy::named("string"), DocTy::named("number")],
            }
        );
    }

    #[test]
    fn test_parse_function_type() {
        let ty = parse_type("fun(a: number, b?: string, ...: any): boolean").unwrap();
        let DocTy::Fun(fun) = ty else {
            panic!("expected function type");
        };
        assert_eq!(fun.params.len(), 2);
        assert!(fun.params[1].optional);
        assert!(fun.vararg.is_some());
        assert_eq!(fun.returns.as_deref(), Some(&DocTy::named("boolean")));
    }

    #[test]
    fn test_parse_nested_function_param() {
        let ty = parse_type("fun(cb: fun(x: number): string, n: number)").unwrap();
        let DocTy::Fun(fun) = ty else {
            panic!("expected function type");
        };
        assert_eq!(fun.params.len(), 2);
        assert_eq!(fun.params[1].name, "n");
    }

    #[test]
    fn test_parse_shape_table() {
        let ty = parse_type("{ name: string, [number]: boolean }").unwrap();
        let DocTy::Table(fields) = ty else {
            panic!("expected table");
        };
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].key, DocFieldKey::Name("name".into()));
        assert!(matches!(fields[1].key, DocFieldKey::Indexer(_)));
    }

    #[test]
    fn test_parse_class_tag() {
        let tag = parse_tag("class List<T> : Base").unwrap();
        let DocTag::Class { name, generics, supers } = tag else {
            panic!("expected class tag");
        };
        assert_eq!(name, "List");
        assert_eq!(generics[0].name, "T");
        assert_eq!(supers, vec![DocTy::named("Base")]);
    }

    #[test]
    fn test_parse_return_list() {
        let tag = parse_tag("return number, string...").unwrap();
        assert_eq!(
            tag,
            DocTag::Return {
                ty: DocTy::Multiple {
                    list: vec![DocTy::named("number"), DocTy::named("string")],
                    variadic: true,
                }
            }
        );
        let tag = parse_tag("return number count the number of items").unwrap();
        assert_eq!(tag, DocTag::Return { ty: DocTy::named("number") });
    }

    #[test]
    fn test_parse_param_and_field() {
        let tag = parse_tag("param name? string the name").unwrap();
        assert!(matches!(tag, DocTag::Param { optional: true, .. }));

        let tag = parse_tag("field private [string] number").unwrap();
        let DocTag::Field { visibility, key, .. } = tag else {
            panic!("expected field tag");
        };
        assert_eq!(visibility.as_deref(), Some("private"));
        assert_eq!(key, DocFieldKey::Indexer(DocTy::named("string")));
    }

    #[test]
    fn test_unknown_tag_is_kept() {
        assert_eq!(
            parse_tag("deprecated").unwrap(),
            DocTag::Other {
                name: "deprecated".into()
            }
        );
    }

    #[test]
    fn test_parse_error() {
        assert!(parse_type("fun(a: ").is_err());
        assert!(parse_tag("overload number").is_err());
    }
}
