use std::io::Write;

use serde::Deserialize;

use crate::ir::Module;
use crate::pass::{parse_config, BoxedPass, Pass, PassContext, PassError, PassType};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AaDumpConfig {
    /// Only dump this function.
    function: Option<String>,
}

/// Prints the alias analysis result of every pair of addresses to the report stream.
pub struct AaDump {
    function: Option<String>,
}

pub fn get_pass(config: &toml::Table) -> Result<BoxedPass, toml::de::Error> {
    let config: AaDumpConfig = parse_config(config)?;
    Ok(Box::new(AaDump {
        function: config.function,
    }))
}

impl Pass for AaDump {
    fn identifier(&self) -> &'static str {
        "aa-dump"
    }

    fn pass_type(&self) -> PassType {
        PassType::Diagnostic
    }

    fn run(&mut self, module: &mut Module, ctx: &mut PassContext) -> Result<(), PassError> {
        for function in module.functions.iter().filter(|f| !f.is_declaration()) {
            if self
                .function
                .as_deref()
                .is_some_and(|name| function.name.as_ref() != name)
            {
                continue;
            }
            let aa = ctx.alias(function)?;
            writeln!(ctx.report, "alias analysis for @{}", function.name)?;
            let addresses: Vec<_> = aa.addresses().collect();
            for (i, a) in addresses.iter().enumerate() {
                for b in &addresses[i + 1..] {
                    writeln!(ctx.report, "{a}, {b}: {}", aa.alias(*a, *b))?;
                }
            }
        }
        Ok(())
    }
}
