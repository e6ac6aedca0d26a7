use vela_core::Ident;

use crate::ir::{BasicBlock, Function, GlobalVariable, Instruction, Module, Terminator};

#[derive(Debug, Clone)]
pub enum VisitorContext<'a> {
    Module(&'a Ident),
    Function(&'a Ident),
    Declaration(&'a Ident),
    Block(&'a Ident),
    Instruction(usize),
}

impl std::fmt::Display for VisitorContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VisitorContext::Module(name) => write!(f, "module {}", name),
            VisitorContext::Function(name) => write!(f, "function @{}", name),
            VisitorContext::Declaration(name) => write!(f, "declaration @{}", name),
            VisitorContext::Block(label) => write!(f, "block {}", label),
            VisitorContext::Instruction(i) => write!(f, "instruction at {}", i),
        }
    }
}

pub trait TracingContext<'a> {
    fn push_context(&mut self, context: VisitorContext<'a>);
    fn pop_context(&mut self);
}

/// A context that keeps the current path, e.g. for log messages.
#[derive(Default)]
pub struct Trace<'a>(Vec<VisitorContext<'a>>);

impl<'a> Trace<'a> {
    pub fn path(&self) -> String {
        let mut path = String::new();
        for (idx, ctx) in self.0.iter().enumerate() {
            if idx != 0 {
                path.push_str(" > ");
            }
            path.push_str(&ctx.to_string());
        }
        path
    }
}

impl<'a> TracingContext<'a> for Trace<'a> {
    fn push_context(&mut self, context: VisitorContext<'a>) {
        self.0.push(context);
    }

    fn pop_context(&mut self) {
        self.0.pop();
    }
}

pub fn default_visit_module<'a, S: IrVisitor + ?Sized>(
    this: &mut S,
    module: &'a Module,
    context: &mut S::Context<'a>,
) {
    context.push_context(VisitorContext::Module(&module.name));
    for global in module.globals.iter() {
        this.visit_global(global, context);
    }
    for function in module.functions.iter() {
        if function.is_declaration() {
            context.push_context(VisitorContext::Declaration(&function.name));
            this.visit_declaration(function, context);
        } else {
            context.push_context(VisitorContext::Function(&function.name));
            this.visit_function(function, context);
        }
        context.pop_context();
    }
    context.pop_context();
}

pub fn default_visit_function<'a, S: IrVisitor + ?Sized>(
    this: &mut S,
    function: &'a Function,
    context: &mut S::Context<'a>,
) {
    for block in function.blocks.iter() {
        context.push_context(VisitorContext::Block(&block.label));
        this.visit_block(block, context);
        context.pop_context();
    }
}

pub fn default_visit_block<'a, S: IrVisitor + ?Sized>(
    this: &mut S,
    block: &'a BasicBlock,
    context: &mut S::Context<'a>,
) {
    for (i, instr) in block.instructions.iter().enumerate() {
        context.push_context(VisitorContext::Instruction(i));
        this.visit_instruction(instr, context);
        context.pop_context();
    }
    this.visit_terminator(&block.terminator, context);
}

pub trait IrVisitor {
    type Context<'a>: TracingContext<'a>;

    fn visit_module<'a>(&mut self, module: &'a Module, context: &mut Self::Context<'a>) {
        default_visit_module(self, module, context);
    }

    fn visit_function<'a>(&mut self, function: &'a Function, context: &mut Self::Context<'a>) {
        default_visit_function(self, function, context);
    }

    fn visit_block<'a>(&mut self, block: &'a BasicBlock, context: &mut Self::Context<'a>) {
        default_visit_block(self, block, context);
    }

    #[allow(unused_variables)]
    fn visit_global<'a>(&mut self, global: &'a GlobalVariable, context: &mut Self::Context<'a>) {}
    #[allow(unused_variables)]
    fn visit_declaration<'a>(
        &mut self,
        function: &'a Function,
        context: &mut Self::Context<'a>,
    ) {
    }
    #[allow(unused_variables)]
    fn visit_instruction<'a>(
        &mut self,
        instruction: &'a Instruction,
        context: &mut Self::Context<'a>,
    ) {
    }
    #[allow(unused_variables)]
    fn visit_terminator<'a>(
        &mut self,
        terminator: &'a Terminator,
        context: &mut Self::Context<'a>,
    ) {
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;

    #[derive(Default)]
    struct PathRecorder {
        paths: Vec<String>,
    }

    impl IrVisitor for PathRecorder {
        type Context<'a> = Trace<'a>;

        fn visit_instruction<'a>(&mut self, _: &'a Instruction, context: &mut Trace<'a>) {
            self.paths.push(context.path());
        }
    }

    #[test]
    fn test_visitor_tracks_context() {
        let text = "fn @ext() -> ()\nfn @f() -> () {\nbb0:\n  br bb1\nbb1:\n  %0 = integer_literal 1 : i8\n  return\n}\n";
        let module = parse_module(text, "m").unwrap();
        let mut recorder = PathRecorder::default();
        recorder.visit_module(&module, &mut Trace::default());
        assert_eq!(
            recorder.paths,
            vec!["module m > function @f > block bb1 > instruction at 0".to_string()]
        );
    }
}
