pub mod cli_missing;
pub mod prompts;
pub mod structured_output;
