//! Command line argument parsing
//!
//! Subcommands:
//! - `process`: Generate a complete practical for a topic
//! - `chat`: Ask the tutor a question
//! - `history`: List recently stored practicals
//! - `show`: Print a stored practical
//! - `compile`: Compile a stored practical's report to PDF
//! - `show-config`: Show configuration discovery information
//! - `init-config`: Write a default user configuration file

use crate::storage::RecordId;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug)]
pub enum ExecutionMode {
    Process(ProcessConfig),
    Chat(ChatConfig),
    History { runtime: RuntimeOptions, limit: usize },
    Show { runtime: RuntimeOptions, id: RecordId, json: bool },
    Compile(CompileConfig),
    ShowConfig,
    InitConfig,
}

/// Options shared by every command that builds a [`crate::MatistSystem`]
#[derive(Debug, Clone, Default, PartialEq, Eq, clap::Args)]
pub struct RuntimeOptions {
    /// Configuration file path
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Workspace directory holding `.matist/`
    #[arg(short = 'w', long = "workspace")]
    pub workspace: Option<PathBuf>,
    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

#[derive(Debug)]
pub struct ProcessConfig {
    pub runtime: RuntimeOptions,
    pub topic: String,
    pub stream: bool,
    pub json: bool,
    pub output: Option<PathBuf>,
}

#[derive(Debug)]
pub struct ChatConfig {
    pub runtime: RuntimeOptions,
    pub question: String,
    pub stream: bool,
}

#[derive(Debug)]
pub struct CompileConfig {
    pub runtime: RuntimeOptions,
    pub id: RecordId,
    pub output: PathBuf,
}

#[derive(Debug, Parser)]
#[command(name = "matist")]
#[command(author = "MATist Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Generates signal-processing practicals (theory, code, optimizations and a LaTeX report) with LLM agents"
)]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Generate a practical for a topic
    Process {
        /// Topic, e.g. "Linear Convolution"
        topic: String,
        /// Print progress events as they happen
        #[arg(short = 's', long = "stream")]
        stream: bool,
        /// Print the result as JSON
        #[arg(long = "json")]
        json: bool,
        /// Write the LaTeX report to this file
        #[arg(short = 'o', long = "output", value_name = "FILE")]
        output: Option<PathBuf>,
        #[command(flatten)]
        runtime: RuntimeOptions,
    },
    /// Ask the tutor a question
    Chat {
        /// Question text
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
        /// Print the answer as it is generated
        #[arg(short = 's', long = "stream")]
        stream: bool,
        #[command(flatten)]
        runtime: RuntimeOptions,
    },
    /// List recently stored practicals
    History {
        /// Maximum number of entries
        #[arg(short = 'n', long = "limit", default_value_t = 10)]
        limit: usize,
        #[command(flatten)]
        runtime: RuntimeOptions,
    },
    /// Print a stored practical
    Show {
        /// Record ID
        id: String,
        /// Print the record as JSON
        #[arg(long = "json")]
        json: bool,
        #[command(flatten)]
        runtime: RuntimeOptions,
    },
    /// Compile a stored practical's LaTeX report to PDF
    Compile {
        /// Record ID
        id: String,
        /// Destination PDF file
        #[arg(short = 'o', long = "output", value_name = "FILE", default_value = "practical.pdf")]
        output: PathBuf,
        #[command(flatten)]
        runtime: RuntimeOptions,
    },
    /// Show configuration discovery information
    ShowConfig,
    /// Create a default configuration file in the user's home directory
    InitConfig,
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }

    pub fn mode(&self) -> Result<ExecutionMode, String> {
        match &self.command {
            Some(Commands::Process {
                topic,
                stream,
                json,
                output,
                runtime,
            }) => {
                if topic.trim().is_empty() {
                    return Err("Topic must not be empty".to_string());
                }
                Ok(ExecutionMode::Process(ProcessConfig {
                    runtime: runtime.clone(),
                    topic: topic.clone(),
                    stream: *stream,
                    json: *json,
                    output: output.clone(),
                }))
            }
            Some(Commands::Chat {
                question,
                stream,
                runtime,
            }) => Ok(ExecutionMode::Chat(ChatConfig {
                runtime: runtime.clone(),
                question: question.join(" "),
                stream: *stream,
            })),
            Some(Commands::History { limit, runtime }) => Ok(ExecutionMode::History {
                runtime: runtime.clone(),
                limit: *limit,
            }),
            Some(Commands::Show { id, json, runtime }) => Ok(ExecutionMode::Show {
                runtime: runtime.clone(),
                id: Self::parse_record_id(id)?,
                json: *json,
            }),
            Some(Commands::Compile {
                id,
                output,
                runtime,
            }) => Ok(ExecutionMode::Compile(CompileConfig {
                runtime: runtime.clone(),
                id: Self::parse_record_id(id)?,
                output: output.clone(),
            })),
            Some(Commands::ShowConfig) => Ok(ExecutionMode::ShowConfig),
            Some(Commands::InitConfig) => Ok(ExecutionMode::InitConfig),
            None => Err(
                "No command specified. Use 'matist --help' to see available commands.".to_string(),
            ),
        }
    }

    fn parse_record_id(raw: &str) -> Result<RecordId, String> {
        RecordId::parse_str(raw.trim()).map_err(|e| format!("Invalid record id '{}': {}", raw, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_command() {
        let args = Args {
            command: Some(Commands::Process {
                topic: "Linear Convolution".to_string(),
                stream: true,
                json: false,
                output: None,
                runtime: RuntimeOptions {
                    verbose: true,
                    ..RuntimeOptions::default()
                },
            }),
        };

        if let ExecutionMode::Process(config) = args.mode().unwrap() {
            assert_eq!(config.topic, "Linear Convolution");
            assert!(config.stream);
            assert!(config.runtime.verbose);
        } else {
            panic!("Expected Process mode");
        }
    }

    #[test]
    fn test_blank_topic_is_rejected() {
        let args = Args {
            command: Some(Commands::Process {
                topic: "   ".to_string(),
                stream: false,
                json: false,
                output: None,
                runtime: RuntimeOptions::default(),
            }),
        };
        assert!(args.mode().is_err());
    }

    #[test]
    fn test_chat_question_is_joined() {
        let args = Args {
            command: Some(Commands::Chat {
                question: vec!["what".to_string(), "is".to_string(), "aliasing?".to_string()],
                stream: false,
                runtime: RuntimeOptions::default(),
            }),
        };

        if let ExecutionMode::Chat(config) = args.mode().unwrap() {
            assert_eq!(config.question, "what is aliasing?");
        } else {
            panic!("Expected Chat mode");
        }
    }

    #[test]
    fn test_record_id_parsing() {
        let id = RecordId::new_v4();
        let args = Args {
            command: Some(Commands::Compile {
                id: id.to_string(),
                output: PathBuf::from("out.pdf"),
                runtime: RuntimeOptions::default(),
            }),
        };
        assert!(matches!(
            args.mode().unwrap(),
            ExecutionMode::Compile(CompileConfig { id: parsed, .. }) if parsed == id
        ));

        let invalid = Args {
            command: Some(Commands::Show {
                id: "not-a-uuid".to_string(),
                json: false,
                runtime: RuntimeOptions::default(),
            }),
        };
        assert!(invalid.mode().unwrap_err().contains("not-a-uuid"));
    }

    #[test]
    fn test_parse_from_command_line() {
        let args = <Args as Parser>::try_parse_from([
            "matist", "history", "--limit", "3", "-c", "custom.toml",
        ])
        .unwrap();

        match args.mode().unwrap() {
            ExecutionMode::History { runtime, limit } => {
                assert_eq!(limit, 3);
                assert_eq!(runtime.config, Some(PathBuf::from("custom.toml")));
            }
            other => panic!("Expected History mode, got {:?}", other),
        }
    }

    #[test]
    fn test_no_command() {
        let args = Args { command: None };
        assert!(args.mode().is_err());
    }
}
