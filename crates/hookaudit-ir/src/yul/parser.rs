//! Recursive-descent parser from a [`Token`] stream to an [`Object`].
//!
//! Each `parse_*` method consumes exactly the grammar production it's named after and
//! leaves the cursor on the first token of whatever follows, the same shape as a
//! hand-written parser for any LL(1) grammar; Yul's grammar is small enough that no
//! parser-generator crate pulls its weight here.

use super::{
    ast::{Block, Case, DataObject, Expression, FunctionDefinition, Literal, Object, Statement, TypedName},
    lexer::{Lexer, SpannedToken, Token},
};
use crate::error::{HookauditError, Result};

pub struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
}

/// Parses a complete top-level Yul object, the unit solc's `--ir` output is one of.
pub fn parse_object(src: &str) -> Result<Object> {
    let tokens = Lexer::new(src).tokenize().map_err(|(offset, message)| HookauditError::YulParse { offset, message })?;
    let mut parser = Parser { tokens, pos: 0 };
    let object = parser.parse_object()?;
    parser.expect(&Token::Eof)?;
    Ok(object)
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos].offset
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.pos].token.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn err(&self, message: impl Into<String>) -> HookauditError {
        HookauditError::YulParse {
            offset: self.offset(),
            message: message.into(),
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        if self.peek() == expected {
            self.bump();
            Ok(())
        } else {
            Err(self.err(format!("expected {expected}, found {}", self.peek())))
        }
    }

    fn expect_identifier_eq(&mut self, word: &str) -> Result<()> {
        match self.peek() {
            Token::Identifier(id) if id == word => {
                self.bump();
                Ok(())
            }
            other => Err(self.err(format!("expected keyword {word:?}, found {other}"))),
        }
    }

    fn bump_identifier(&mut self) -> Result<String> {
        match self.bump() {
            Token::Identifier(id) => Ok(id),
            other => Err(self.err(format!("expected identifier, found {other}"))),
        }
    }

    fn peek_is_identifier(&self, word: &str) -> bool {
        matches!(self.peek(), Token::Identifier(id) if id == word)
    }

    fn parse_object(&mut self) -> Result<Object> {
        self.expect_identifier_eq("object")?;
        let name = self.bump_string()?;
        self.expect(&Token::LBrace)?;
        self.expect_identifier_eq("code")?;
        let code = self.parse_block()?;
        let mut data = Vec::new();
        let mut children = Vec::new();
        while !matches!(self.peek(), Token::RBrace) {
            if self.peek_is_identifier("object") {
                children.push(self.parse_object()?);
            } else if self.peek_is_identifier("data") {
                self.bump();
                let dname = self.bump_string()?;
                let literal = self.parse_literal()?;
                data.push(DataObject { name: dname, literal });
            } else {
                return Err(self.err(format!("expected 'object' or 'data', found {}", self.peek())));
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(Object { name, code, data, children })
    }

    fn bump_string(&mut self) -> Result<String> {
        match self.bump() {
            Token::StringLiteral(s) => Ok(s),
            other => Err(self.err(format!("expected string literal, found {other}"))),
        }
    }

    fn parse_block(&mut self) -> Result<Block> {
        self.expect(&Token::LBrace)?;
        let mut statements = Vec::new();
        while !matches!(self.peek(), Token::RBrace) {
            statements.push(self.parse_statement()?);
        }
        self.expect(&Token::RBrace)?;
        Ok(Block { statements })
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        match self.peek().clone() {
            Token::LBrace => Ok(Statement::Block(self.parse_block()?)),
            Token::Identifier(word) if word == "function" => self.parse_function_definition(),
            Token::Identifier(word) if word == "let" => self.parse_variable_declaration(),
            Token::Identifier(word) if word == "if" => self.parse_if(),
            Token::Identifier(word) if word == "switch" => self.parse_switch(),
            Token::Identifier(word) if word == "for" => self.parse_for(),
            Token::Identifier(word) if word == "break" => {
                self.bump();
                Ok(Statement::Break)
            }
            Token::Identifier(word) if word == "continue" => {
                self.bump();
                Ok(Statement::Continue)
            }
            Token::Identifier(word) if word == "leave" => {
                self.bump();
                Ok(Statement::Leave)
            }
            _ => self.parse_assignment_or_expression_statement(),
        }
    }

    fn parse_function_definition(&mut self) -> Result<Statement> {
        self.bump();
        let name = self.bump_identifier()?;
        self.expect(&Token::LParen)?;
        let params = self.parse_typed_name_list()?;
        self.expect(&Token::RParen)?;
        let mut returns = Vec::new();
        if matches!(self.peek(), Token::Arrow) {
            self.bump();
            returns = self.parse_typed_name_list()?;
        }
        let body = self.parse_block()?;
        Ok(Statement::FunctionDefinition(FunctionDefinition {
            name,
            params,
            returns,
            body,
        }))
    }

    fn parse_typed_name_list(&mut self) -> Result<Vec<TypedName>> {
        let mut names = Vec::new();
        if matches!(self.peek(), Token::Identifier(_)) {
            loop {
                names.push(TypedName {
                    name: self.bump_identifier()?,
                });
                if matches!(self.peek(), Token::Comma) {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        Ok(names)
    }

    fn parse_variable_declaration(&mut self) -> Result<Statement> {
        self.bump();
        let mut names = vec![TypedName {
            name: self.bump_identifier()?,
        }];
        while matches!(self.peek(), Token::Comma) {
            self.bump();
            names.push(TypedName {
                name: self.bump_identifier()?,
            });
        }
        let value = if matches!(self.peek(), Token::ColonEquals) {
            self.bump();
            Some(self.parse_expression()?)
        } else {
            None
        };
        Ok(Statement::VariableDeclaration { names, value })
    }

    /// Disambiguates `x := ...` / `x, y := ...` assignment from a bare expression
    /// statement by speculatively parsing one identifier and checking what follows,
    /// mirroring how solc's own grammar resolves the ambiguity.
    fn parse_assignment_or_expression_statement(&mut self) -> Result<Statement> {
        if let Token::Identifier(first) = self.peek().clone() {
            let save = self.pos;
            self.bump();
            if matches!(self.peek(), Token::Comma | Token::ColonEquals) {
                let mut names = vec![first];
                while matches!(self.peek(), Token::Comma) {
                    self.bump();
                    names.push(self.bump_identifier()?);
                }
                self.expect(&Token::ColonEquals)?;
                let value = self.parse_expression()?;
                return Ok(Statement::Assignment { names, value });
            }
            self.pos = save;
        }
        Ok(Statement::ExpressionStatement(self.parse_expression()?))
    }

    fn parse_if(&mut self) -> Result<Statement> {
        self.bump();
        let condition = self.parse_expression()?;
        let body = self.parse_block()?;
        Ok(Statement::If { condition, body })
    }

    fn parse_switch(&mut self) -> Result<Statement> {
        self.bump();
        let scrutinee = self.parse_expression()?;
        let mut cases = Vec::new();
        loop {
            if self.peek_is_identifier("case") {
                self.bump();
                let value = self.parse_literal()?;
                let body = self.parse_block()?;
                cases.push(Case { value: Some(value), body });
            } else if self.peek_is_identifier("default") {
                self.bump();
                let body = self.parse_block()?;
                cases.push(Case { value: None, body });
                break;
            } else {
                break;
            }
        }
        Ok(Statement::Switch { scrutinee, cases })
    }

    fn parse_for(&mut self) -> Result<Statement> {
        self.bump();
        let init = self.parse_block()?;
        let condition = self.parse_expression()?;
        let post = self.parse_block()?;
        let body = self.parse_block()?;
        Ok(Statement::ForLoop { init, condition, post, body })
    }

    fn parse_literal(&mut self) -> Result<Literal> {
        match self.bump() {
            Token::Number(n) => Ok(Literal::Decimal(n)),
            Token::HexNumber(n) => Ok(Literal::Hex(n)),
            Token::StringLiteral(s) => Ok(Literal::Str(s)),
            Token::HexStringLiteral(s) => Ok(Literal::HexStr(s)),
            Token::Identifier(word) if word == "true" => Ok(Literal::Decimal("1".to_string())),
            Token::Identifier(word) if word == "false" => Ok(Literal::Decimal("0".to_string())),
            other => Err(self.err(format!("expected literal, found {other}"))),
        }
    }

    fn parse_expression(&mut self) -> Result<Expression> {
        match self.peek().clone() {
            Token::Number(_) | Token::HexNumber(_) | Token::StringLiteral(_) | Token::HexStringLiteral(_) => {
                Ok(Expression::Literal(self.parse_literal()?))
            }
            Token::Identifier(word) if word == "true" || word == "false" => Ok(Expression::Literal(self.parse_literal()?)),
            Token::Identifier(name) => {
                let offset = self.offset();
                self.bump();
                if matches!(self.peek(), Token::LParen) {
                    self.bump();
                    let mut args = Vec::new();
                    if !matches!(self.peek(), Token::RParen) {
                        loop {
                            args.push(self.parse_expression()?);
                            if matches!(self.peek(), Token::Comma) {
                                self.bump();
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(&Token::RParen)?;
                    Ok(Expression::FunctionCall { name, args, offset })
                } else {
                    Ok(Expression::Identifier(name))
                }
            }
            other => Err(self.err(format!("expected expression, found {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::yul::ast::{Statement, TypedName};

    #[test]
    fn parses_minimal_object() {
        let src = r#"
            object "C" {
                code {
                    function f(a, b) -> c {
                        let x := add(a, b)
                        c := x
                    }
                }
                data "metadata" hex"1234"
            }
        "#;
        let object = parse_object(src).unwrap();
        assert_eq!(object.name, "C");
        assert_eq!(object.data.len(), 1);
        assert_eq!(object.data[0].name, "metadata");
        assert_eq!(object.code.statements.len(), 1);
        match &object.code.statements[0] {
            Statement::FunctionDefinition(f) => {
                assert_eq!(f.name, "f");
                assert_eq!(f.params, vec![TypedName { name: "a".into() }, TypedName { name: "b".into() }]);
                assert_eq!(f.returns, vec![TypedName { name: "c".into() }]);
                assert_eq!(f.body.statements.len(), 2);
            }
            other => panic!("expected function definition, got {other:?}"),
        }
    }

    #[test]
    fn parses_nested_object_and_control_flow() {
        let src = r#"
            object "C" {
                code { }
                object "C_deployed" {
                    code {
                        switch calldataload(0)
                        case 0 { sstore(0, 1) }
                        default { revert(0, 0) }
                        for { let i := 0 } lt(i, 10) { i := add(i, 1) } {
                            if eq(i, 5) { break }
                        }
                    }
                }
            }
        "#;
        let object = parse_object(src).unwrap();
        assert_eq!(object.children.len(), 1);
        assert_eq!(object.children[0].name, "C_deployed");
        assert_eq!(object.children[0].code.statements.len(), 2);
    }

    #[test]
    fn parses_multi_assignment() {
        let src = r#"object "C" { code { a, b := f() } }"#;
        let object = parse_object(src).unwrap();
        match &object.code.statements[0] {
            Statement::Assignment { names, .. } => assert_eq!(names, &["a".to_string(), "b".to_string()]),
            other => panic!("expected assignment, got {other:?}"),
        }
    }
}
