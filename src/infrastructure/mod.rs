pub mod mongodb;
pub mod parser_adapter;
pub mod parsers;
pub mod sqlite;
