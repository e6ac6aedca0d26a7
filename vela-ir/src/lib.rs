pub mod diagnostic;
pub mod ir;
pub mod parser;
pub mod pass;
pub mod pprint;
pub mod serialized;
pub mod types;
pub mod verifier;
