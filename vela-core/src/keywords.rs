pub const FN: &str = "fn";
pub const GLOBAL: &str = "global";
pub const VTABLE: &str = "vtable";
pub const WITNESS_TABLE: &str = "witness_table";
pub const METADATA: &str = "metadata";
pub const LOC: &str = "loc";
pub const UNIT: &str = "()";
pub const FUNC: &str = "func";

pub const INTEGER_LITERAL: &str = "integer_literal";
pub const ALLOC_STACK: &str = "alloc_stack";
pub const DEALLOC_STACK: &str = "dealloc_stack";
pub const LOAD: &str = "load";
pub const STORE: &str = "store";
pub const GLOBAL_ADDR: &str = "global_addr";
pub const FUNCTION_REF: &str = "function_ref";
pub const APPLY: &str = "apply";
pub const ALLOC_REF: &str = "alloc_ref";
pub const CLASS_METHOD: &str = "class_method";
pub const WITNESS_METHOD: &str = "witness_method";
pub const STRONG_RETAIN: &str = "strong_retain";
pub const STRONG_RELEASE: &str = "strong_release";
pub const COND_FAIL: &str = "cond_fail";
pub const ASSERT_CONFIG: &str = "assert_config";
pub const DEBUG_VALUE: &str = "debug_value";

pub const RETURN: &str = "return";
pub const BR: &str = "br";
pub const COND_BR: &str = "cond_br";
pub const UNREACHABLE: &str = "unreachable";

pub const TRANSPARENT: &str = "transparent";
pub const PRIVATE: &str = "private";
pub const NORETURN: &str = "noreturn";
