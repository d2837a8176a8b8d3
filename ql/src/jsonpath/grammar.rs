use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "jsonpath.pest"]
pub struct JsonPathParser;
