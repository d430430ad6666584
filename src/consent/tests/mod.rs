mod common;
mod token;
