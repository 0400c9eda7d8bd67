//! LL(1) recursive-descent parser.
//!
//! The parser walks the token stream with a single token of lookahead and
//! never backtracks. The two classic ambiguities are settled exactly as
//! the grammar prescribes:
//!
//! - `[` opens a type-argument list only after a path segment with an
//!   uppercase initial (`Foo[I32]`) or after a method name
//!   (`x.method[I32](…)`); everywhere else it is an array literal or an
//!   index.
//! - `|` is always bitwise-or in expressions; closures are spelled
//!   `do(a, b) …`, so no pipe-delimited parameter list exists.
//!
//! Errors synchronize at `;` and declaration-starting keywords; malformed
//! regions become `Error` nodes so every parse produces a complete tree.

pub mod ast;

mod expressions;
mod patterns;
mod statements;
mod types;

use std::error::Error;
use std::fmt::Display;

use crate::diagnostics::Diagnostic;
use crate::lexer::{Token, TokenKind, TokenValue};
use crate::session::Session;
use crate::source::{FileId, Span};

use self::ast::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub position: Span,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for ParseError {}

pub type ParseResult<T> = Result<T, ParseError>;

pub struct Parser<'a> {
    session: &'a Session,
    tokens: Vec<Token>,
    index: usize,
    next_node_id: u32,
    pending_directives: Vec<AiDirective>,
}

/// Parse one file into a module. The returned tree is complete even when
/// diagnostics were recorded; error nodes mark the gaps.
pub fn parse_module(
    session: &Session,
    file: FileId,
    tokens: Vec<Token>,
    module_path: Vec<String>,
) -> Module<()> {
    Parser::new(session, tokens).module(file, module_path)
}

impl<'a> Parser<'a> {
    pub fn new(session: &'a Session, tokens: Vec<Token>) -> Self {
        Parser {
            session,
            tokens,
            index: 0,
            next_node_id: 0,
            pending_directives: vec![],
        }
    }

    // ---- cursor -------------------------------------------------------

    pub(crate) fn peek(&self) -> &Token {
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    pub(crate) fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    /// One extra token of context, used only where the grammar's
    /// disambiguation rules are phrased as "immediately followed by".
    pub(crate) fn second_kind(&self) -> TokenKind {
        self.tokens
            .get(self.index + 1)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    pub(crate) fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    pub(crate) fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    pub(crate) fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.at(kind) {
            Ok(self.bump())
        } else {
            Err(self.error_here(format!(
                "expected {}, found {}",
                kind.describe(),
                self.peek_kind().describe()
            )))
        }
    }

    pub(crate) fn fresh_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        id
    }

    pub(crate) fn span_here(&self) -> Span {
        self.peek().span
    }

    /// Record a parse diagnostic and build the error value used for
    /// unwinding to the nearest recovery point.
    pub(crate) fn error_here(&self, message: impl Into<String>) -> ParseError {
        let message = message.into();
        let position = self.span_here();
        self.session
            .emit(Diagnostic::error("E0100", message.clone(), position));
        ParseError { message, position }
    }

    pub(crate) fn expect_ident(&mut self) -> ParseResult<Ident<()>> {
        let token = self.expect(TokenKind::Ident)?;
        let id = self.fresh_id();
        Ok(Ident::new(token.ident(), token.span, id))
    }

    /// Skip forward to a token that can start a declaration, or `Eof`.
    fn synchronize_item(&mut self) {
        loop {
            match self.peek_kind() {
                TokenKind::Eof
                | TokenKind::Func
                | TokenKind::Type
                | TokenKind::Behavior
                | TokenKind::Extend
                | TokenKind::Const
                | TokenKind::Use
                | TokenKind::Mod
                | TokenKind::Pub
                | TokenKind::Async => return,
                TokenKind::Semicolon => {
                    self.bump();
                    return;
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    /// Skip to the next statement boundary inside a block.
    pub(crate) fn synchronize_statement(&mut self) {
        loop {
            match self.peek_kind() {
                TokenKind::Eof | TokenKind::RBrace => return,
                TokenKind::Semicolon => {
                    self.bump();
                    return;
                }
                TokenKind::Let
                | TokenKind::Return
                | TokenKind::While
                | TokenKind::Loop
                | TokenKind::For
                | TokenKind::Break
                | TokenKind::Continue => return,
                _ => {
                    self.bump();
                }
            }
        }
    }

    // ---- items --------------------------------------------------------

    fn module(mut self, file: FileId, module_path: Vec<String>) -> Module<()> {
        let start = self.span_here();
        let caps = match self.try_parse_caps() {
            Ok(caps) => caps,
            Err(_) => {
                self.synchronize_item();
                None
            }
        };

        let mut declarations = vec![];
        while !self.at(TokenKind::Eof) {
            let decl_start = self.span_here();
            match self.parse_declaration() {
                Ok(Some(declaration)) => declarations.push(declaration),
                Ok(None) => {}
                Err(_) => {
                    self.synchronize_item();
                    declarations.push(Declaration::Error(decl_start));
                }
            }
        }

        let end = self.span_here();
        Module {
            path: module_path,
            caps,
            declarations,
            position: if self.tokens.len() > 1 {
                start.merge(&end)
            } else {
                Span::new(file, 0, 0)
            },
        }
    }

    fn try_parse_caps(&mut self) -> ParseResult<Option<CapsDecl>> {
        if !self.at(TokenKind::Caps) {
            return Ok(None);
        }
        let start = self.bump().span;
        self.expect(TokenKind::Colon)?;
        self.expect(TokenKind::LBracket)?;
        let mut effects = vec![];
        if !self.at(TokenKind::RBracket) {
            loop {
                effects.push(self.parse_effect_path()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        let end = self.expect(TokenKind::RBracket)?.span;
        self.eat(TokenKind::Semicolon);
        Ok(Some(CapsDecl {
            effects,
            position: start.merge(&end),
        }))
    }

    pub(crate) fn parse_effect_path(&mut self) -> ParseResult<EffectPath> {
        let first = self.expect(TokenKind::Ident)?;
        let start = first.span;
        let mut end = first.span;
        let mut segments = vec![first.ident().to_string()];
        while self.eat(TokenKind::Dot) {
            let segment = self.expect(TokenKind::Ident)?;
            end = segment.span;
            segments.push(segment.ident().to_string());
        }
        Ok(EffectPath {
            segments,
            position: start.merge(&end),
        })
    }

    /// Consume AI-directive tokens queued before a declaration.
    fn drain_directives(&mut self) {
        while self.at(TokenKind::AiDirective) {
            let token = self.bump();
            if let TokenValue::Directive { name, payload } = token.value {
                self.pending_directives.push(AiDirective {
                    name,
                    payload,
                    position: token.span,
                });
            }
        }
    }

    fn take_directives(&mut self) -> Vec<AiDirective> {
        std::mem::take(&mut self.pending_directives)
    }

    /// `@a1b2c3d4` before a declaration pins its stable ID.
    fn try_parse_stable_id(&mut self) -> ParseResult<Option<String>> {
        if !self.at(TokenKind::At) {
            return Ok(None);
        }
        self.bump();
        let token = self.bump();
        let text = self.session.source_map.snippet(token.span).to_string();
        let valid_len = text.len() >= 8 && text.len() <= 12;
        if !valid_len || !text.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()) {
            return Err(self.error_here(format!(
                "`@{text}` is not a valid stable ID (want 8 lowercase hex digits)"
            )));
        }
        Ok(Some(format!("@{text}")))
    }

    fn parse_declaration(&mut self) -> ParseResult<Option<Declaration<()>>> {
        self.drain_directives();
        if self.at(TokenKind::Eof) {
            return Ok(None);
        }
        let stable_id = self.try_parse_stable_id()?;

        let visibility = if self.eat(TokenKind::Pub) {
            Visibility::Public
        } else {
            Visibility::Private
        };

        match self.peek_kind() {
            TokenKind::Func | TokenKind::Async => {
                let function = self.parse_function(visibility, stable_id)?;
                Ok(Some(Declaration::Function(function)))
            }
            TokenKind::Type => Ok(Some(self.parse_type_decl(visibility, stable_id)?)),
            TokenKind::Behavior => Ok(Some(self.parse_behavior_decl(visibility, stable_id)?)),
            TokenKind::Const => Ok(Some(self.parse_const_decl(visibility, stable_id)?)),
            TokenKind::Extend => Ok(Some(self.parse_extend_decl()?)),
            TokenKind::Use => Ok(Some(self.parse_use_decl()?)),
            TokenKind::Mod => Ok(Some(self.parse_mod_decl()?)),
            other => Err(self.error_here(format!(
                "expected a declaration, found {}",
                other.describe()
            ))),
        }
    }

    pub(crate) fn parse_function(
        &mut self,
        visibility: Visibility,
        stable_id: Option<String>,
    ) -> ParseResult<FunctionDecl<()>> {
        let directives = self.take_directives();
        let is_async = self.eat(TokenKind::Async);
        let start = self.expect(TokenKind::Func)?.span;
        let name = self.expect_ident()?;
        let generics = self.parse_generic_params()?;

        self.expect(TokenKind::LParen)?;
        let mut this_param = None;
        let mut parameters = vec![];
        if !self.at(TokenKind::RParen) {
            loop {
                if self.at(TokenKind::This) {
                    let token = self.bump();
                    if this_param.is_some() || !parameters.is_empty() {
                        self.session.emit(Diagnostic::error(
                            "E0101",
                            "`this` must be the first parameter",
                            token.span,
                        ));
                    }
                    this_param = Some(false);
                } else if self.at(TokenKind::Mut) && self.second_kind() == TokenKind::This {
                    self.bump();
                    self.bump();
                    this_param = Some(true);
                } else {
                    let param_name = self.expect_ident()?;
                    self.expect(TokenKind::Colon)?;
                    let type_annotation = self.parse_type_name()?;
                    let position = param_name.position.merge(&type_annotation.position());
                    parameters.push(Parameter {
                        name: param_name,
                        type_annotation,
                        position,
                    });
                }
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;

        let return_type = if self.eat(TokenKind::Arrow) {
            Some(self.parse_type_name()?)
        } else {
            None
        };

        let declared_effects = if self.eat(TokenKind::Uses) {
            let mut effects = vec![self.parse_effect_path()?];
            while self.eat(TokenKind::Comma) {
                effects.push(self.parse_effect_path()?);
            }
            Some(effects)
        } else {
            None
        };

        let where_clauses = self.parse_where_clauses()?;
        let body = self.parse_block()?;
        let position = start.merge(&body.position);
        let id = self.fresh_id();

        Ok(FunctionDecl {
            visibility,
            is_async,
            name,
            generics,
            this_param,
            parameters,
            return_type,
            declared_effects,
            where_clauses,
            body,
            stable_id,
            directives,
            info: (),
            position,
            id,
        })
    }

    fn parse_generic_params(&mut self) -> ParseResult<Vec<GenericParam>> {
        if !self.at(TokenKind::LBracket) {
            return Ok(vec![]);
        }
        self.bump();
        let mut generics = vec![];
        loop {
            let name = self.expect_ident()?;
            let mut bounds = vec![];
            if self.eat(TokenKind::Colon) {
                bounds.push(self.parse_type_name()?);
                while self.eat(TokenKind::Plus) {
                    bounds.push(self.parse_type_name()?);
                }
            }
            generics.push(GenericParam {
                name: name.name,
                bounds,
                position: name.position,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBracket)?;
        Ok(generics)
    }

    fn parse_where_clauses(&mut self) -> ParseResult<Vec<WhereClause>> {
        if !self.eat(TokenKind::Where) {
            return Ok(vec![]);
        }
        let mut clauses = vec![];
        loop {
            let param = self.expect_ident()?;
            self.expect(TokenKind::Colon)?;
            let mut bounds = vec![self.parse_type_name()?];
            while self.eat(TokenKind::Plus) {
                bounds.push(self.parse_type_name()?);
            }
            clauses.push(WhereClause {
                param: param.name,
                bounds,
                position: param.position,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(clauses)
    }

    fn parse_type_decl(
        &mut self,
        visibility: Visibility,
        stable_id: Option<String>,
    ) -> ParseResult<Declaration<()>> {
        let directives = self.take_directives();
        let start = self.expect(TokenKind::Type)?.span;
        let name = self.expect_ident()?;
        let generics = self.parse_generic_params()?;
        self.expect(TokenKind::Assign)?;

        let body = if self.at(TokenKind::LBrace) {
            TypeDeclBody::Struct(self.parse_struct_fields()?)
        } else if self.at(TokenKind::Ident)
            && starts_uppercase(self.peek().ident())
            && matches!(self.second_kind(), TokenKind::LParen | TokenKind::Pipe)
        {
            TypeDeclBody::Enum(self.parse_enum_variants()?)
        } else {
            TypeDeclBody::Alias(self.parse_type_name()?)
        };

        let end = self.expect(TokenKind::Semicolon)?.span;
        let id = self.fresh_id();
        Ok(Declaration::Type(TypeDecl {
            visibility,
            name: name.name,
            generics,
            body,
            stable_id,
            directives,
            position: start.merge(&end),
            id,
        }))
    }

    fn parse_struct_fields(&mut self) -> ParseResult<Vec<FieldDecl>> {
        self.expect(TokenKind::LBrace)?;
        let mut fields = vec![];
        while !self.at(TokenKind::RBrace) {
            let visibility = if self.eat(TokenKind::Pub) {
                Visibility::Public
            } else {
                Visibility::Private
            };
            let name = self.expect_ident()?;
            self.expect(TokenKind::Colon)?;
            let type_name = self.parse_type_name()?;
            let position = name.position.merge(&type_name.position());
            fields.push(FieldDecl {
                visibility,
                name: name.name,
                type_name,
                position,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(fields)
    }

    fn parse_enum_variants(&mut self) -> ParseResult<Vec<VariantDecl>> {
        let mut variants = vec![];
        loop {
            let name = self.expect_ident()?;
            let mut payload = vec![];
            if self.eat(TokenKind::LParen) {
                if !self.at(TokenKind::RParen) {
                    loop {
                        payload.push(self.parse_type_name()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RParen)?;
            }
            variants.push(VariantDecl {
                name: name.name,
                payload,
                position: name.position,
            });
            if !self.eat(TokenKind::Pipe) {
                break;
            }
        }
        Ok(variants)
    }

    fn parse_behavior_decl(
        &mut self,
        visibility: Visibility,
        stable_id: Option<String>,
    ) -> ParseResult<Declaration<()>> {
        let directives = self.take_directives();
        let start = self.expect(TokenKind::Behavior)?.span;
        let name = self.expect_ident()?;
        let generics = self.parse_generic_params()?;
        self.expect(TokenKind::LBrace)?;

        let mut associated_types = vec![];
        let mut methods = vec![];
        while !self.at(TokenKind::RBrace) {
            if self.eat(TokenKind::Type) {
                let assoc = self.expect_ident()?;
                associated_types.push(assoc.name);
                self.expect(TokenKind::Semicolon)?;
            } else {
                methods.push(self.parse_method_signature()?);
            }
        }
        let end = self.expect(TokenKind::RBrace)?.span;
        let id = self.fresh_id();

        Ok(Declaration::Behavior(BehaviorDecl {
            visibility,
            name: name.name,
            generics,
            associated_types,
            methods,
            stable_id,
            directives,
            position: start.merge(&end),
            id,
        }))
    }

    fn parse_method_signature(&mut self) -> ParseResult<MethodSig> {
        let start = self.expect(TokenKind::Func)?.span;
        let name = self.expect_ident()?;
        self.expect(TokenKind::LParen)?;

        let mut this_param = None;
        let mut parameters = vec![];
        if !self.at(TokenKind::RParen) {
            loop {
                if self.at(TokenKind::This) {
                    self.bump();
                    this_param = Some(false);
                } else if self.at(TokenKind::Mut) && self.second_kind() == TokenKind::This {
                    self.bump();
                    self.bump();
                    this_param = Some(true);
                } else {
                    let param = self.expect_ident()?;
                    self.expect(TokenKind::Colon)?;
                    let type_name = self.parse_type_name()?;
                    parameters.push((param.name, type_name));
                }
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;

        let return_type = if self.eat(TokenKind::Arrow) {
            Some(self.parse_type_name()?)
        } else {
            None
        };

        let declared_effects = if self.eat(TokenKind::Uses) {
            let mut effects = vec![self.parse_effect_path()?];
            while self.eat(TokenKind::Comma) {
                effects.push(self.parse_effect_path()?);
            }
            Some(effects)
        } else {
            None
        };

        let end = self.expect(TokenKind::Semicolon)?.span;
        Ok(MethodSig {
            name: name.name,
            this_param,
            parameters,
            return_type,
            declared_effects,
            position: start.merge(&end),
        })
    }

    fn parse_extend_decl(&mut self) -> ParseResult<Declaration<()>> {
        let directives = self.take_directives();
        let start = self.expect(TokenKind::Extend)?.span;
        let target = self.parse_type_name()?;
        let behavior = if self.eat(TokenKind::With) {
            Some(self.parse_type_name()?)
        } else {
            None
        };

        self.expect(TokenKind::LBrace)?;
        let mut associated_bindings = vec![];
        let mut methods = vec![];
        while !self.at(TokenKind::RBrace) {
            if self.eat(TokenKind::Type) {
                let assoc = self.expect_ident()?;
                self.expect(TokenKind::Assign)?;
                let bound = self.parse_type_name()?;
                self.expect(TokenKind::Semicolon)?;
                associated_bindings.push((assoc.name, bound));
            } else {
                let visibility = if self.eat(TokenKind::Pub) {
                    Visibility::Public
                } else {
                    Visibility::Private
                };
                let stable_id = self.try_parse_stable_id()?;
                methods.push(self.parse_function(visibility, stable_id)?);
            }
        }
        let end = self.expect(TokenKind::RBrace)?.span;
        let id = self.fresh_id();

        Ok(Declaration::Extend(ExtendDecl {
            target,
            behavior,
            associated_bindings,
            methods,
            directives,
            position: start.merge(&end),
            id,
        }))
    }

    fn parse_const_decl(
        &mut self,
        visibility: Visibility,
        stable_id: Option<String>,
    ) -> ParseResult<Declaration<()>> {
        let directives = self.take_directives();
        let start = self.expect(TokenKind::Const)?.span;
        let name = self.expect_ident()?;
        self.expect(TokenKind::Colon)?;
        let type_annotation = self.parse_type_name()?;
        self.expect(TokenKind::Assign)?;
        let value = self.parse_expression(false)?;
        let end = self.expect(TokenKind::Semicolon)?.span;
        let id = self.fresh_id();

        Ok(Declaration::Const(ConstDecl {
            visibility,
            name,
            type_annotation,
            value,
            stable_id,
            directives,
            info: (),
            position: start.merge(&end),
            id,
        }))
    }

    fn parse_use_decl(&mut self) -> ParseResult<Declaration<()>> {
        let start = self.expect(TokenKind::Use)?.span;
        let mut path = vec![self.expect_ident()?.name];
        while self.eat(TokenKind::PathSep) {
            path.push(self.expect_ident()?.name);
        }
        let alias = if self.eat(TokenKind::As) {
            Some(self.expect_ident()?.name)
        } else {
            None
        };
        let end = self.expect(TokenKind::Semicolon)?.span;
        let id = self.fresh_id();
        Ok(Declaration::Use(UseDecl {
            path,
            alias,
            position: start.merge(&end),
            id,
        }))
    }

    fn parse_mod_decl(&mut self) -> ParseResult<Declaration<()>> {
        let start = self.expect(TokenKind::Mod)?.span;
        let name = self.expect_ident()?;
        let end = self.expect(TokenKind::Semicolon)?.span;
        let id = self.fresh_id();
        Ok(Declaration::Mod(ModDecl {
            name: name.name,
            position: start.merge(&end),
            id,
        }))
    }
}

pub(crate) fn starts_uppercase(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use super::*;
    use crate::lexer::Lexer;

    /// Lex and parse a source string as a root module named `main`.
    pub fn parse_source(src: &str) -> (Session, Module<()>) {
        let mut session = Session::default();
        let file = session.source_map.add_file("main.tml", src);
        let tokens = Lexer::new(&session, file).lex();
        let module = parse_module(&session, file, tokens, vec!["main".to_string()]);
        (session, module)
    }
}

#[cfg(test)]
mod tests {
    use super::test_helpers::parse_source;
    use super::ast::*;

    #[test]
    fn test_parse_simple_function() {
        let (session, module) = parse_source("func add(a: I32, b: I32) -> I32 { return a + b }");
        assert!(!session.has_errors());
        assert_eq!(module.declarations.len(), 1);
        let Declaration::Function(func) = &module.declarations[0] else {
            panic!("expected a function declaration");
        };
        assert_eq!(func.name.name, "add");
        assert_eq!(func.parameters.len(), 2);
        assert!(matches!(
            func.return_type,
            Some(TypeName::Named { ref path, .. }) if path == &vec!["I32".to_string()]
        ));
    }

    #[test]
    fn test_parse_enum_and_alias() {
        let (session, module) = parse_source(
            "type Maybe[T] = Just(T) | Nothing;\ntype Meters = I32;\n",
        );
        assert!(!session.has_errors());
        let Declaration::Type(maybe) = &module.declarations[0] else {
            panic!("expected a type declaration");
        };
        let TypeDeclBody::Enum(variants) = &maybe.body else {
            panic!("expected an enum");
        };
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].name, "Just");
        assert_eq!(variants[1].payload.len(), 0);

        let Declaration::Type(meters) = &module.declarations[1] else {
            panic!("expected a type declaration");
        };
        assert!(matches!(meters.body, TypeDeclBody::Alias(_)));
    }

    #[test]
    fn test_parse_struct_decl() {
        let (session, module) = parse_source("type Point = { pub x: I32, y: I32 };");
        assert!(!session.has_errors());
        let Declaration::Type(decl) = &module.declarations[0] else {
            panic!("expected a type declaration");
        };
        let TypeDeclBody::Struct(fields) = &decl.body else {
            panic!("expected a struct");
        };
        assert_eq!(fields.len(), 2);
        assert!(fields[0].visibility.is_public());
        assert!(!fields[1].visibility.is_public());
    }

    #[test]
    fn test_parse_behavior_and_extend() {
        let (session, module) = parse_source(
            "behavior Reader { type Item; func read(this) -> I32; }\n\
             extend File with Reader { type Item = U8; func read(this) -> I32 { return 0 } }",
        );
        assert!(!session.has_errors());
        let Declaration::Behavior(behavior) = &module.declarations[0] else {
            panic!("expected a behavior");
        };
        assert_eq!(behavior.associated_types, vec!["Item".to_string()]);
        assert_eq!(behavior.methods.len(), 1);
        assert_eq!(behavior.methods[0].this_param, Some(false));

        let Declaration::Extend(extend) = &module.declarations[1] else {
            panic!("expected an extend block");
        };
        assert!(extend.behavior.is_some());
        assert_eq!(extend.associated_bindings.len(), 1);
        assert_eq!(extend.methods.len(), 1);
    }

    #[test]
    fn test_parse_caps_and_uses() {
        let (session, module) = parse_source(
            "caps: [io.file, crypto.random];\n\
             func read_all(path: Str) -> Str uses io.file.read { return path }",
        );
        assert!(!session.has_errors());
        let caps = module.caps.expect("caps should be recorded");
        assert_eq!(caps.effects.len(), 2);
        assert_eq!(caps.effects[0].dotted(), "io.file");

        let Declaration::Function(func) = &module.declarations[0] else {
            panic!("expected a function");
        };
        let effects = func.declared_effects.as_ref().unwrap();
        assert_eq!(effects[0].dotted(), "io.file.read");
    }

    #[test]
    fn test_parse_stable_id_annotation() {
        let (session, module) = parse_source("@deadbeef func f() { }");
        assert!(!session.has_errors());
        let Declaration::Function(func) = &module.declarations[0] else {
            panic!("expected a function");
        };
        assert_eq!(func.stable_id.as_deref(), Some("@deadbeef"));
    }

    #[test]
    fn test_parse_ai_directive_attaches_to_next_decl() {
        let (session, module) = parse_source(
            "// @ai: intent \"hot path\"\nfunc f() { }\nfunc g() { }",
        );
        assert!(!session.has_errors());
        let Declaration::Function(f) = &module.declarations[0] else {
            panic!();
        };
        let Declaration::Function(g) = &module.declarations[1] else {
            panic!();
        };
        assert_eq!(f.directives.len(), 1);
        assert_eq!(f.directives[0].name, "intent");
        assert!(g.directives.is_empty());
    }

    #[test]
    fn test_parse_recovers_at_item_boundary() {
        let (session, module) = parse_source("func broken( { }\nfunc ok() { }");
        assert!(session.has_errors());
        // The error node stands in and the next function still parses.
        assert!(module
            .declarations
            .iter()
            .any(|d| matches!(d, Declaration::Error(_))));
        assert!(module.declarations.iter().any(
            |d| matches!(d, Declaration::Function(f) if f.name.name == "ok"),
        ));
    }

    #[test]
    fn test_parse_where_clause() {
        let (session, module) = parse_source(
            "func show_all[T](items: [T]) -> Str where T: Show + Clone { return \"\" }",
        );
        assert!(!session.has_errors());
        let Declaration::Function(func) = &module.declarations[0] else {
            panic!("expected a function");
        };
        assert_eq!(func.where_clauses.len(), 1);
        assert_eq!(func.where_clauses[0].param, "T");
        assert_eq!(func.where_clauses[0].bounds.len(), 2);
    }
}
