use phf::phf_ordered_map;
use vela_ir::pass::{diagnostic, transform, PassConstructor, PassType};

pub struct PassInfo {
    /// What the constructed pass reports as its [`PassType`].
    pub category: PassType,
    pub description: &'static str,
    pub constructor: PassConstructor,
}

macro_rules! pass {
    ($category:ident, $description:literal, $constructor:path) => {
        PassInfo {
            category: PassType::$category,
            description: $description,
            constructor: $constructor,
        }
    };
}

pub static PASSES: phf::OrderedMap<&'static str, PassInfo> = phf_ordered_map! {
    "noreturn-folding" => pass!(Transform, "Fold the code after calls to noreturn functions", transform::noreturn::get_pass),
    "definite-init" => pass!(Diagnostic, "Diagnose stack slots used before being initialized", diagnostic::definite_init::get_pass),
    "mandatory-inlining" => pass!(Transform, "Inline calls of transparent functions", transform::inliner::get_mandatory_pass),
    "diagnostic-constant-propagation" => pass!(Transform, "Fold constants and diagnose overflows", transform::constant_propagation::get_diagnostic_pass),
    "performance-constant-propagation" => pass!(Transform, "Fold constants", transform::constant_propagation::get_performance_pass),
    "diagnose-unreachable" => pass!(Transform, "Warn about and remove unreachable code", transform::diagnose_unreachable::get_pass),
    "dataflow-diagnostics" => pass!(Diagnostic, "Diagnose missing returns", diagnostic::dataflow::get_pass),
    "simplify-cfg" => pass!(Transform, "Simplify the control flow graph", transform::simplify_cfg::get_pass),
    "mem2reg" => pass!(Transform, "Promote stack slots to values", transform::mem2reg::get_pass),
    "cse" => pass!(Transform, "Common subexpression elimination", transform::cse::get_pass),
    "dce" => pass!(Transform, "Dead code elimination", transform::dce::get_pass),
    "devirtualize" => pass!(Transform, "Resolve method lookups with known receivers", transform::devirtualize::get_pass),
    "inline" => pass!(Transform, "Inline small functions", transform::inliner::get_performance_pass),
    "arc-opts" => pass!(Transform, "Remove redundant retain/release pairs", transform::arc::get_pass),
    "load-store-opts" => pass!(Transform, "Forward stores to loads and remove dead stores", transform::load_store::get_pass),
    "global-opt" => pass!(Transform, "Remove unused private globals", transform::global_opt::get_pass),
    "dead-function-elim" => pass!(Transform, "Remove unreachable private functions", transform::dead_function::get_pass),
    "strip-debug-info" => pass!(Transform, "Remove debug values", transform::strip_debug::get_pass),
    "linker" => pass!(Transform, "Link declarations against serialized libraries", transform::linker::get_pass),
    "inst-count" => pass!(Diagnostic, "Record instruction statistics", diagnostic::inst_count::get_pass),
    "aa-dump" => pass!(Diagnostic, "Print alias analysis results", diagnostic::aa_dump::get_pass),
};

/// Mandatory correctness passes, in order.
pub static DIAGNOSTICS: &[&str] = &[
    "noreturn-folding",
    "definite-init",
    "mandatory-inlining",
    "diagnostic-constant-propagation",
    "diagnose-unreachable",
    "dataflow-diagnostics",
];

pub static PERFORMANCE: &[&str] = &[
    "simplify-cfg",
    "mem2reg",
    "performance-constant-propagation",
    "cse",
    "devirtualize",
    "inline",
    "performance-constant-propagation",
    "load-store-opts",
    "mem2reg",
    "cse",
    "arc-opts",
    "dce",
    "simplify-cfg",
    "global-opt",
    "dead-function-elim",
];

pub fn lookup(identifier: &str) -> Option<&'static PassInfo> {
    PASSES.get(identifier)
}

/// Like [`lookup`], also returning the catalog's own copy of the identifier.
pub fn lookup_entry(identifier: &str) -> Option<(&'static str, &'static PassInfo)> {
    PASSES.get_entry(identifier).map(|(name, info)| (*name, info))
}

/// One line per pass: identifier, category and description.
pub fn fmt_catalog<W: std::fmt::Write>(f: &mut W) -> std::fmt::Result {
    let width = PASSES.keys().map(|name| name.len()).max().unwrap_or(0);
    for (name, info) in PASSES.entries() {
        writeln!(
            f,
            "{name:<width$}  {:<10}  {}",
            info.category.to_string(),
            info.description
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use vela_ir::pass::Pass;

    use super::*;

    #[test]
    fn test_constructed_passes_match_their_entries() {
        for (name, info) in PASSES.entries() {
            let pass = (info.constructor)(&toml::Table::new()).unwrap();
            assert_eq!(pass.identifier(), *name);
            assert_eq!(pass.pass_type(), info.category, "{name}");
        }
    }

    #[test]
    fn test_groups_only_name_catalog_entries() {
        for name in DIAGNOSTICS.iter().chain(PERFORMANCE) {
            assert!(lookup(name).is_some(), "{name}");
        }
        assert!(lookup("loop-unroll").is_none());
    }

    #[test]
    fn test_catalog_listing_keeps_order() {
        let mut out = String::new();
        fmt_catalog(&mut out).unwrap();
        let first = out.lines().next().unwrap();
        assert!(first.starts_with("noreturn-folding"));
        assert!(first.ends_with("Fold the code after calls to noreturn functions"));
        assert_eq!(out.lines().count(), PASSES.len());
    }

    #[test]
    fn test_pass_config_is_checked() {
        let config: toml::Table = toml::from_str("threshold = 3").unwrap();
        assert!((lookup("inline").unwrap().constructor)(&config).is_ok());
        assert!((lookup("cse").unwrap().constructor)(&config).is_err());
    }
}
