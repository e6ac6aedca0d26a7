use winnow::ascii::digit1;
use winnow::combinator::{alt, cut_err, fail, opt, preceded, repeat, separated, terminated};
use winnow::error::ContextError;
use winnow::error::{StrContext, StrContextValue};
use winnow::{PResult, Parser};

use vela_core::{input, keywords, Ident, Input, Location, SourceMap};
use vela_parsing::{
    braced, bracketed, expect, identifier, integer, location, opt_or_default, parenthesized, sigiled,
    skip_space, string, unsigned, ws_or_comment,
};

use crate::ir::{
    BasicBlock, BinOp, Function, FunctionAttributes, GlobalVariable, Instruction, MethodRef,
    Module, Op, TableEntry, Terminator, TerminatorKind, VTable, Value, WitnessTable,
};
use crate::types::{IntWidth, Type};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{location}: {message}")]
pub struct ParseFailure {
    pub location: Location,
    pub message: String,
}

/// Parses a textual module. The name is not part of the text and is supplied by the caller.
pub fn parse_module(text: &str, name: impl Into<Ident>) -> Result<Module, ParseFailure> {
    let map = SourceMap::new(text);
    let items = terminated(repeat(0.., preceded(ws_or_comment, item)), ws_or_comment)
        .parse(input(text, &map))
        .map_err(|err| {
            let message = err.inner().to_string().replace('\n', "; ");
            ParseFailure {
                location: map.location(err.offset()),
                message: if message.is_empty() {
                    "unexpected input".to_string()
                } else {
                    message
                },
            }
        })?;
    let mut module = Module::new(name);
    for item in Vec::<Item>::into_iter(items) {
        match item {
            Item::Global(global) => module.globals.push(global),
            Item::Function(function) => module.functions.push(function),
            Item::VTable(vtable) => module.vtables.push(vtable),
            Item::WitnessTable(table) => module.witness_tables.push(table),
            Item::Metadata(entries) => module.metadata.extend(entries),
        }
    }
    Ok(module)
}

enum Item {
    Global(GlobalVariable),
    Function(Function),
    VTable(VTable),
    WitnessTable(WitnessTable),
    Metadata(Vec<(String, lexpr::Value)>),
}

fn leading<'a, O, F>(f: F) -> impl Parser<Input<'a>, O, ContextError>
where
    F: Parser<Input<'a>, O, ContextError>,
{
    preceded(ws_or_comment, f)
}

fn item(i: &mut Input) -> PResult<Item> {
    let loc = location(i)?;
    let keyword = identifier.context(expect("top-level item")).parse_next(i)?;
    match keyword.as_ref() {
        keywords::GLOBAL => cut_err(global)
            .map(|mut global| {
                global.loc = Some(loc);
                Item::Global(global)
            })
            .parse_next(i),
        keywords::FN => cut_err(function)
            .map(|mut function| {
                function.loc = Some(loc);
                Item::Function(function)
            })
            .parse_next(i),
        keywords::VTABLE => cut_err(vtable)
            .map(|mut vtable| {
                vtable.loc = Some(loc);
                Item::VTable(vtable)
            })
            .parse_next(i),
        keywords::WITNESS_TABLE => cut_err(witness_table)
            .map(|mut table| {
                table.loc = Some(loc);
                Item::WitnessTable(table)
            })
            .parse_next(i),
        keywords::METADATA => cut_err(metadata).map(Item::Metadata).parse_next(i),
        _ => fail.context(expect("top-level item")).parse_next(i),
    }
}

pub fn value(i: &mut Input) -> PResult<Value> {
    preceded('%', digit1.try_map(|s: &str| s.parse::<usize>()))
        .map(Value)
        .context(expect("value"))
        .parse_next(i)
}

fn int_width(i: &mut Input) -> PResult<IntWidth> {
    identifier
        .verify_map(|id: Ident| IntWidth::from_name(id.as_ref()))
        .context(expect("integer type"))
        .parse_next(i)
}

pub fn ty(i: &mut Input) -> PResult<Type> {
    alt((
        keywords::UNIT.value(Type::Unit),
        preceded('*', ty).map(|inner| Type::Address(Box::new(inner))),
        sigiled('$').map(Type::Object),
        identifier.verify_map(|id: Ident| match id.as_ref() {
            keywords::FUNC => Some(Type::Function),
            other => IntWidth::from_name(other).map(Type::Int),
        }),
    ))
    .context(expect("type"))
    .parse_next(i)
}

fn method_ref(i: &mut Input) -> PResult<MethodRef> {
    (preceded('#', identifier), '.', identifier)
        .map(|(class, _, method)| MethodRef { class, method })
        .context(expect("method reference"))
        .parse_next(i)
}

fn attributes(i: &mut Input) -> PResult<Vec<Ident>> {
    opt_or_default(leading(bracketed(separated(
        0..,
        skip_space(identifier),
        ',',
    ))))
    .parse_next(i)
}

fn global(i: &mut Input) -> PResult<GlobalVariable> {
    (
        leading(sigiled('@')),
        skip_space(':'),
        ty,
        attributes.verify_map(|attrs: Vec<Ident>| match attrs.as_slice() {
            [] => Some(false),
            [attr] if attr.as_ref() == keywords::PRIVATE => Some(true),
            _ => None,
        }),
    )
        .map(|(name, _, ty, private)| GlobalVariable {
            name,
            ty,
            private,
            loc: None,
        })
        .context(StrContext::Label("global"))
        .parse_next(i)
}

fn function_attributes(i: &mut Input) -> PResult<FunctionAttributes> {
    attributes
        .verify_map(|attrs: Vec<Ident>| {
            let mut result = FunctionAttributes::default();
            for attr in attrs {
                match attr.as_ref() {
                    keywords::TRANSPARENT => result.transparent = true,
                    keywords::PRIVATE => result.private = true,
                    keywords::NORETURN => result.noreturn = true,
                    _ => return None,
                }
            }
            Some(result)
        })
        .context(expect("function attributes"))
        .parse_next(i)
}

fn parameter(i: &mut Input) -> PResult<(Value, Type)> {
    (value, skip_space(':'), ty)
        .map(|(value, _, ty)| (value, ty))
        .parse_next(i)
}

fn function(i: &mut Input) -> PResult<Function> {
    let name = leading(sigiled('@')).parse_next(i)?;
    let params = leading(parenthesized(separated(0.., skip_space(parameter), ',')))
        .parse_next(i)?;
    let return_type = preceded(skip_space("->"), ty).parse_next(i)?;
    let attributes = function_attributes(i)?;
    let blocks = opt_or_default(leading(braced(repeat(1.., skip_space(basic_block)))))
        .parse_next(i)?;
    Ok(Function {
        name,
        params,
        return_type,
        attributes,
        blocks,
        loc: None,
    })
}

enum Statement {
    Instruction(Instruction),
    Terminator(Terminator),
}

fn basic_block(i: &mut Input) -> PResult<BasicBlock> {
    let label = terminated(identifier, skip_space(':')).parse_next(i)?;
    let mut instructions = Vec::new();
    loop {
        ws_or_comment(i)?;
        match cut_err(statement).parse_next(i)? {
            Statement::Instruction(inst) => instructions.push(inst),
            Statement::Terminator(terminator) => {
                return Ok(BasicBlock {
                    label,
                    instructions,
                    terminator,
                })
            }
        }
    }
}

fn loc_suffix(i: &mut Input) -> PResult<Location> {
    (
        skip_space(','),
        keywords::LOC,
        leading(unsigned),
        ':',
        unsigned,
    )
        .map(|(_, _, line, _, column)| Location::new(line, column))
        .parse_next(i)
}

fn statement(i: &mut Input) -> PResult<Statement> {
    let start = location(i)?;
    let result = opt(terminated(value, skip_space('='))).parse_next(i)?;
    let mnemonic = identifier.context(expect("instruction")).parse_next(i)?;
    let terminator = match mnemonic.as_ref() {
        keywords::RETURN => Some(TerminatorKind::Return(
            opt(leading(value)).parse_next(i)?,
        )),
        keywords::BR => Some(TerminatorKind::Branch(leading(identifier).parse_next(i)?)),
        keywords::COND_BR => {
            let (condition, _, then_dest, _, else_dest) = (
                leading(value),
                skip_space(','),
                identifier,
                skip_space(','),
                identifier,
            )
                .parse_next(i)?;
            Some(TerminatorKind::CondBranch {
                condition,
                then_dest,
                else_dest,
            })
        }
        keywords::UNREACHABLE => Some(TerminatorKind::Unreachable),
        _ => None,
    };
    if let Some(kind) = terminator {
        if result.is_some() {
            return fail
                .context(StrContext::Expected(StrContextValue::Description(
                    "terminator without a result",
                )))
                .parse_next(i);
        }
        let loc = opt(loc_suffix).parse_next(i)?.unwrap_or(start);
        return Ok(Statement::Terminator(Terminator {
            kind,
            loc: Some(loc),
        }));
    }
    let op = operation(mnemonic.as_ref(), i)?;
    let loc = opt(loc_suffix).parse_next(i)?.unwrap_or(start);
    Ok(Statement::Instruction(Instruction {
        result,
        op,
        loc: Some(loc),
    }))
}

fn operation(mnemonic: &str, i: &mut Input) -> PResult<Op> {
    use keywords::*;
    match mnemonic {
        INTEGER_LITERAL => (leading(integer), skip_space(':'), int_width)
            .map(|(value, _, width)| Op::IntegerLiteral { value, width })
            .parse_next(i),
        ALLOC_STACK => leading(ty).map(Op::AllocStack).parse_next(i),
        DEALLOC_STACK => leading(value).map(Op::DeallocStack).parse_next(i),
        LOAD => (leading(value), skip_space(':'), ty)
            .map(|(address, _, ty)| Op::Load { address, ty })
            .parse_next(i),
        STORE => (leading(value), skip_space("to"), value)
            .map(|(value, _, address)| Op::Store { value, address })
            .parse_next(i),
        GLOBAL_ADDR => (leading(sigiled('@')), skip_space(':'), ty)
            .map(|(global, _, ty)| Op::GlobalAddr { global, ty })
            .parse_next(i),
        FUNCTION_REF => leading(sigiled('@')).map(Op::FunctionRef).parse_next(i),
        APPLY => (
            leading(value),
            parenthesized(separated(0.., skip_space(value), ',')),
            skip_space(':'),
            ty,
        )
            .map(|(callee, args, _, ty)| Op::Apply { callee, args, ty })
            .parse_next(i),
        ALLOC_REF => leading(sigiled('$')).map(Op::AllocRef).parse_next(i),
        CLASS_METHOD => (leading(value), skip_space(','), method_ref)
            .map(|(object, _, method)| Op::ClassMethod { object, method })
            .parse_next(i),
        WITNESS_METHOD => (
            leading(sigiled('$')),
            skip_space(':'),
            identifier,
            skip_space(','),
            method_ref,
        )
            .map(|(conformer, _, protocol, _, method)| Op::WitnessMethod {
                conformer,
                protocol,
                method,
            })
            .parse_next(i),
        STRONG_RETAIN => leading(value).map(Op::StrongRetain).parse_next(i),
        STRONG_RELEASE => leading(value).map(Op::StrongRelease).parse_next(i),
        COND_FAIL => (leading(value), skip_space(','), string)
            .map(|(condition, _, message)| Op::CondFail { condition, message })
            .parse_next(i),
        ASSERT_CONFIG => Ok(Op::AssertConfig),
        DEBUG_VALUE => (leading(value), skip_space(','), string)
            .map(|(value, _, name)| Op::DebugValue { value, name })
            .parse_next(i),
        other => match BinOp::from_mnemonic(other) {
            Some(op) => (leading(value), skip_space(','), value, skip_space(':'), int_width)
                .map(|(lhs, _, rhs, _, width)| Op::Binary {
                    op,
                    lhs,
                    rhs,
                    width,
                })
                .parse_next(i),
            None => fail.context(expect("instruction mnemonic")).parse_next(i),
        },
    }
}

fn table_entry(i: &mut Input) -> PResult<TableEntry> {
    (method_ref, skip_space(':'), sigiled('@'))
        .map(|(method, _, implementation)| TableEntry {
            method,
            implementation,
        })
        .parse_next(i)
}

fn table_entries(i: &mut Input) -> PResult<Vec<TableEntry>> {
    leading(braced(terminated(
        separated(0.., skip_space(table_entry), ','),
        opt(','),
    )))
    .parse_next(i)
}

fn vtable(i: &mut Input) -> PResult<VTable> {
    (leading(sigiled('$')), table_entries)
        .map(|(class, entries)| VTable {
            class,
            entries,
            loc: None,
        })
        .parse_next(i)
}

fn witness_table(i: &mut Input) -> PResult<WitnessTable> {
    (
        leading(sigiled('$')),
        skip_space(':'),
        identifier,
        table_entries,
    )
        .map(|(conformer, _, protocol, entries)| WitnessTable {
            conformer,
            protocol,
            entries,
            loc: None,
        })
        .parse_next(i)
}

fn metadata_entry(i: &mut Input) -> PResult<(String, lexpr::Value)> {
    (
        identifier,
        skip_space("="),
        winnow::token::take_until(1.., ';'),
        ';',
    )
        .verify_map(|(key, _, value, _): (Ident, _, &str, _)| {
            lexpr::from_str(value.trim())
                .ok()
                .map(|value| (key.to_string(), value))
        })
        .context(expect("metadata entry"))
        .parse_next(i)
}

fn metadata(i: &mut Input) -> PResult<Vec<(String, lexpr::Value)>> {
    leading(braced(repeat(0.., skip_space(metadata_entry)))).parse_next(i)
}
