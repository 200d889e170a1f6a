// Parser for Arc .arc source files.
//
// Parses a token stream (from the lexer) into the sum-type AST. Uses chumsky
// combinators; expression precedence is a ladder of left folds.
//
// Preconditions: input is a valid token stream from `lexer::lex()`.
// Postconditions: returns an AST plus any parse errors (non-fatal).
// Failure modes: syntax errors produce `Rich` diagnostics.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::ast::*;
use crate::lexer::Token;
use crate::units;

/// Result of parsing: AST plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub program: Option<Program>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Parse an Arc source string. Lexes then parses.
///
/// Returns an AST (if parsing succeeded) plus any errors.
pub fn parse(source: &str) -> ParseResult {
    let lexed = crate::lexer::lex(source);
    let eoi = SimpleSpan::from(source.len()..source.len());
    let stream = Stream::from_iter(lexed.tokens).map(eoi, |(t, s): (_, _)| (t, s));

    let (program, parse_errors) = program_parser(source).parse(stream).into_output_errors();

    // Lex errors first; they usually explain the parse errors after them.
    let mut all_errors: Vec<Rich<'static, Token, SimpleSpan>> = lexed
        .errors
        .into_iter()
        .map(|e| Rich::custom(e.span, e.message))
        .collect();
    all_errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    ParseResult {
        program,
        errors: all_errors,
    }
}

fn join(a: Span, b: Span) -> Span {
    (a.start..b.end).into()
}

fn binary(lhs: Expr, (op, rhs): (BinOp, Expr)) -> Expr {
    Expr {
        span: join(lhs.span, rhs.span),
        kind: ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)),
    }
}

/// A flow chain with no operators inside a stage is a single invocation.
fn stage_item(flow: FlowStmt) -> StageItem {
    match flow {
        FlowStmt {
            first: FlowElem::Node(node),
            chain,
            ..
        } if chain.is_empty() => StageItem::Single(node),
        flow => StageItem::Flow(flow),
    }
}

enum Postfix {
    Index(Expr),
    Slice(Option<Expr>, Option<Expr>),
}

// ── Main parser builder ──
//
// All grammar rules are built inside `program_parser` so that the `source`
// reference is captured once and shared by all combinators.

fn program_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, Program, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    // ── Identifier ──

    let ident = just(Token::Ident).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        Ident {
            name: source[span.start()..span.end()].to_string(),
            span,
        }
    });

    let unit_name = ident.clone().try_map(|id, span| {
        if units::lookup(&id.name).is_some() {
            Ok(id)
        } else {
            Err(Rich::custom(span, format!("unknown unit '{}'", id.name)))
        }
    });

    // ── Types ──

    let type_expr = recursive(|ty| {
        let prim = select! { Token::Prim(p) => p }
            .then(unit_name.or_not())
            .map_with(|(p, unit), e| TypeExpr {
                kind: TypeExprKind::Prim(p, unit),
                span: e.span(),
            });
        let dir = just(Token::LArrow)
            .to(ChanDir::Read)
            .or(just(Token::Arrow).to(ChanDir::Write))
            .or_not()
            .map(|d| d.unwrap_or(ChanDir::Both));
        let chan = dir
            .then_ignore(just(Token::Chan))
            .then(ty.clone())
            .map_with(|(dir, inner), e| TypeExpr {
                kind: TypeExprKind::Chan(Box::new(inner), dir),
                span: e.span(),
            });
        let series = just(Token::Series)
            .ignore_then(ty)
            .map_with(|inner, e| TypeExpr {
                kind: TypeExprKind::Series(Box::new(inner)),
                span: e.span(),
            });
        choice((prim, chan, series))
    });

    // ── Expressions ──

    let expr = recursive(|expr| {
        let literal = select! {
            Token::Int(v) => Literal::Int(v),
            Token::Float(v) => Literal::Float(v),
            Token::UnitLit(u) => Literal::Unit { value: u.value, integral: u.integral, unit: u.unit },
            Token::StringLit(s) => Literal::Str(s),
        }
        .map_with(|lit, e| Expr {
            kind: ExprKind::Literal(lit),
            span: e.span(),
        });

        let args = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LParen), just(Token::RParen));

        let call = ident
            .clone()
            .then(args)
            .map_with(|(callee, args), e| Expr {
                kind: ExprKind::Call { callee, args },
                span: e.span(),
            });

        let cast = select! { Token::Prim(p) => p }
            .map_with(|p, e| TypeExpr {
                kind: TypeExprKind::Prim(p, None),
                span: e.span(),
            })
            .then(
                expr.clone()
                    .delimited_by(just(Token::LParen), just(Token::RParen)),
            )
            .map_with(|(ty, value), e| Expr {
                kind: ExprKind::Cast {
                    ty,
                    value: Box::new(value),
                },
                span: e.span(),
            });

        let name = ident.clone().map(|id| Expr {
            kind: ExprKind::Ident(id.name),
            span: id.span,
        });

        let series = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBracket), just(Token::RBracket))
            .map_with(|items, e| Expr {
                kind: ExprKind::Series(items),
                span: e.span(),
            });

        let paren = expr
            .clone()
            .delimited_by(just(Token::LParen), just(Token::RParen));

        let atom = choice((literal, cast, call, name, series, paren)).boxed();

        // ── Postfix: index and slice ──

        let slice = expr
            .clone()
            .or_not()
            .then_ignore(just(Token::Colon))
            .then(expr.clone().or_not())
            .map(|(start, end)| Postfix::Slice(start, end));
        let index = expr.clone().map(Postfix::Index);
        let suffix = slice
            .or(index)
            .delimited_by(just(Token::LBracket), just(Token::RBracket))
            .map_with(|p, e| (p, e.span()));

        let postfix = atom.foldl(suffix.repeated(), |target, (p, span): (Postfix, Span)| {
            let span = join(target.span, span);
            let kind = match p {
                Postfix::Index(i) => ExprKind::Index {
                    target: Box::new(target),
                    index: Box::new(i),
                },
                Postfix::Slice(start, end) => ExprKind::Slice {
                    target: Box::new(target),
                    start: start.map(Box::new),
                    end: end.map(Box::new),
                },
            };
            Expr { kind, span }
        })
        .boxed();

        // ── Unary ──

        let unary_op = just(Token::Minus)
            .to(UnaryOp::Neg)
            .or(just(Token::Not).to(UnaryOp::Not))
            .map_with(|op, e| (op, e.span()));
        let unary = unary_op
            .repeated()
            .foldr(postfix, |(op, span): (UnaryOp, Span), operand| Expr {
                span: join(span, operand.span),
                kind: ExprKind::Unary(op, Box::new(operand)),
            })
            .boxed();

        // ── Power (right-associative) ──

        let power = unary
            .clone()
            .then(
                just(Token::Caret)
                    .ignore_then(unary)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(first, mut rest): (Expr, Vec<Expr>)| {
                let Some(mut acc) = rest.pop() else {
                    return first;
                };
                while let Some(base) = rest.pop() {
                    acc = binary(base, (BinOp::Pow, acc));
                }
                binary(first, (BinOp::Pow, acc))
            })
            .boxed();

        // ── Binary ladder ──

        let mul_op = just(Token::Star)
            .to(BinOp::Mul)
            .or(just(Token::Slash).to(BinOp::Div))
            .or(just(Token::Percent).to(BinOp::Mod));
        let mul = power
            .clone()
            .foldl(mul_op.then(power).repeated(), binary)
            .boxed();

        let add_op = just(Token::Plus)
            .to(BinOp::Add)
            .or(just(Token::Minus).to(BinOp::Sub));
        let add = mul.clone().foldl(add_op.then(mul).repeated(), binary).boxed();

        let rel_op = choice((
            just(Token::Lt).to(BinOp::Lt),
            just(Token::Gt).to(BinOp::Gt),
            just(Token::LtEq).to(BinOp::Le),
            just(Token::GtEq).to(BinOp::Ge),
        ));
        let rel = add.clone().foldl(rel_op.then(add).repeated(), binary).boxed();

        let eq_op = just(Token::EqEq)
            .to(BinOp::Eq)
            .or(just(Token::NotEq).to(BinOp::Ne));
        let eq = rel.clone().foldl(eq_op.then(rel).repeated(), binary).boxed();

        let and = eq
            .clone()
            .foldl(just(Token::And).to(BinOp::And).then(eq).repeated(), binary)
            .boxed();

        and.clone()
            .foldl(just(Token::Or).to(BinOp::Or).then(and).repeated(), binary)
    });

    // ── Statements ──

    let index_target = {
        let slice = expr
            .clone()
            .or_not()
            .then_ignore(just(Token::Colon))
            .then(expr.clone().or_not())
            .map(|(start, end)| Index::Slice(start.map(Box::new), end.map(Box::new)));
        let single = expr.clone().map(Index::Single);
        slice
            .or(single)
            .delimited_by(just(Token::LBracket), just(Token::RBracket))
    };

    let block = recursive(|block| {
        let declare = just(Token::Declare)
            .to(false)
            .or(just(Token::StatefulDeclare).to(true));

        let var_decl = ident
            .clone()
            .then(type_expr.clone().or_not())
            .then(declare)
            .then(expr.clone())
            .map(|(((name, ty), stateful), value)| StmtKind::VarDecl {
                name,
                ty,
                value,
                stateful,
            });

        let channel_read = ident
            .clone()
            .then_ignore(just(Token::Declare))
            .then_ignore(just(Token::LArrow))
            .then(ident.clone())
            .map(|(name, channel)| StmtKind::ChannelRead { name, channel });

        let assign_op = choice((
            just(Token::Assign).to(AssignOp::Set),
            just(Token::PlusAssign).to(AssignOp::Add),
            just(Token::MinusAssign).to(AssignOp::Sub),
            just(Token::StarAssign).to(AssignOp::Mul),
            just(Token::SlashAssign).to(AssignOp::Div),
            just(Token::PercentAssign).to(AssignOp::Mod),
        ));

        let assign = ident
            .clone()
            .then(index_target.clone().or_not())
            .then(assign_op)
            .then(expr.clone())
            .map(|(((name, index), op), value)| StmtKind::Assign {
                target: AssignTarget { name, index },
                op,
                value,
            });

        let channel_write = expr
            .clone()
            .then_ignore(just(Token::Arrow))
            .then(ident.clone())
            .map(|(value, channel)| StmtKind::ChannelWrite { value, channel });

        let else_if = just(Token::Else)
            .ignore_then(just(Token::If))
            .ignore_then(expr.clone())
            .then(block.clone());

        let if_stmt = just(Token::If)
            .ignore_then(expr.clone())
            .then(block.clone())
            .then(else_if.repeated().collect::<Vec<_>>())
            .then(just(Token::Else).ignore_then(block.clone()).or_not())
            .map(|(((cond, then), else_ifs), otherwise)| StmtKind::If {
                cond,
                then,
                else_ifs,
                otherwise,
            });

        let return_stmt = just(Token::Return)
            .ignore_then(expr.clone().or_not())
            .map(StmtKind::Return);

        let expr_stmt = expr.clone().map(StmtKind::Expr);

        let stmt = choice((
            if_stmt,
            return_stmt,
            channel_read,
            var_decl,
            assign,
            channel_write,
            expr_stmt,
        ))
        .map_with(|kind, e| Stmt {
            kind,
            span: e.span(),
        })
        .then_ignore(just(Token::Semicolon).or_not());

        stmt.repeated()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBrace), just(Token::RBrace))
            .map_with(|stmts, e| Block {
                stmts,
                span: e.span(),
            })
    });

    // ── Flow nodes ──

    let config_values = {
        let named = ident
            .clone()
            .then_ignore(just(Token::Assign))
            .then(expr.clone())
            .separated_by(just(Token::Comma))
            .at_least(1)
            .allow_trailing()
            .collect::<Vec<_>>()
            .map(ConfigValues::Named);
        let anonymous = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .map(ConfigValues::Anonymous);
        named.or(anonymous)
    };

    let func_call = ident
        .clone()
        .then(config_values.delimited_by(just(Token::LBrace), just(Token::RBrace)))
        .map_with(|(name, config), e| FuncCall {
            name,
            config,
            span: e.span(),
        });

    let flow_node = choice((
        just(Token::Next).map_with(|_, e| FlowNode::Next(e.span())),
        func_call.map(FlowNode::Call),
        expr.clone().map(FlowNode::Expr),
    ));

    let routing_entry = ident
        .clone()
        .then_ignore(just(Token::Colon))
        .then(
            flow_node
                .clone()
                .separated_by(just(Token::Arrow))
                .at_least(1)
                .collect::<Vec<_>>(),
        )
        .then(just(Token::Colon).ignore_then(ident.clone()).or_not())
        .map_with(|((label, nodes), param), e| RoutingEntry {
            label,
            nodes,
            param,
            span: e.span(),
        });

    let routing_table = routing_entry
        .separated_by(just(Token::Comma))
        .at_least(1)
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LBrace), just(Token::RBrace))
        .map_with(|entries, e| RoutingTable {
            entries,
            span: e.span(),
        });

    let flow_elem = routing_table
        .map(FlowElem::Table)
        .or(flow_node.map(FlowElem::Node));

    let flow_op = just(Token::Arrow)
        .to(FlowOp::Continuous)
        .or(just(Token::FatArrow).to(FlowOp::OneShot));

    let flow_stmt = flow_elem
        .clone()
        .then(
            flow_op
                .then(flow_elem)
                .map(|(op, elem)| FlowLink { op, elem })
                .repeated()
                .collect::<Vec<_>>(),
        )
        .map_with(|(first, chain), e| FlowStmt {
            first,
            chain,
            span: e.span(),
        });

    // ── Functions ──

    let param = ident
        .clone()
        .then(type_expr.clone())
        .map_with(|(name, ty), e| Param {
            name,
            ty,
            span: e.span(),
        });

    let config_block = param
        .clone()
        .then_ignore(just(Token::Comma).or_not())
        .repeated()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LBrace), just(Token::RBrace));

    let input = ident
        .clone()
        .then(type_expr.clone())
        .then(just(Token::Assign).ignore_then(expr.clone()).or_not())
        .map_with(|((name, ty), default), e| InputParam {
            name,
            ty,
            default,
            span: e.span(),
        });

    let inputs = input
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen));

    let outputs = param
        .separated_by(just(Token::Comma))
        .at_least(1)
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen))
        .map(Outputs::Named)
        .or(type_expr.clone().map(Outputs::Single))
        .or_not()
        .map(|o| o.unwrap_or(Outputs::None));

    let func_decl = just(Token::Func)
        .ignore_then(ident.clone())
        .then(config_block.or_not())
        .then(inputs)
        .then(outputs)
        .then(block)
        .map(|((((name, config), inputs), outputs), body)| {
            ItemKind::Function(FunctionDecl {
                name,
                config: config.unwrap_or_default(),
                inputs,
                outputs,
                body,
            })
        });

    // ── Sequences ──

    let stage = just(Token::Stage)
        .ignore_then(ident.clone())
        .then(
            flow_stmt
                .clone()
                .map(stage_item)
                .then_ignore(just(Token::Comma).or_not())
                .repeated()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LBrace), just(Token::RBrace)),
        )
        .map_with(|(name, items), e| StageDecl {
            name,
            items,
            span: e.span(),
        });

    let sequence_decl = just(Token::Sequence)
        .ignore_then(ident.clone())
        .then(
            stage
                .repeated()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LBrace), just(Token::RBrace)),
        )
        .map(|(name, stages)| ItemKind::Sequence(SequenceDecl { name, stages }));

    // ── Global constants ──

    let global_const = ident
        .clone()
        .then(type_expr.or_not())
        .then_ignore(just(Token::Declare))
        .then(expr)
        .map(|((name, ty), value)| ItemKind::Constant(GlobalConst { name, ty, value }));

    // ── Program ──

    let item = choice((
        func_decl,
        sequence_decl,
        global_const,
        flow_stmt.map(ItemKind::Flow),
    ))
    .map_with(|kind, e| Item {
        kind,
        span: e.span(),
    })
    .then_ignore(just(Token::Semicolon).or_not());

    item.repeated()
        .collect::<Vec<_>>()
        .map_with(|items, e| Program {
            items,
            span: e.span(),
        })
}

// ── Tests ──
