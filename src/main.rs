use edututor::ai::SessionProvider;
use edututor::config::{self, Settings};
use edututor::timeline::Message;
use edututor::{Assistant, Mode, TurnOutcome, logging};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Prints a streamed reply incrementally.
#[derive(Default)]
struct ReplyPrinter {
    shown: String,
}

impl ReplyPrinter {
    fn update(&mut self, msg: &Message) {
        let content = msg.content();
        let mut out = std::io::stdout();
        match content.strip_prefix(self.shown.as_str()) {
            Some(delta) => {
                let _ = write!(out, "{delta}");
            }
            // An error replaced the partial reply.
            None => {
                let _ = write!(out, "\n{content}");
            }
        }
        self.shown.clear();
        self.shown.push_str(content);
        let _ = out.flush();
    }
}

fn print_message(msg: &Message) {
    println!("[{}] {}", msg.role().as_str(), msg.content());
}

fn print_sources(msg: &Message) {
    if msg.sources().is_empty() {
        return;
    }
    println!("Sources:");
    for source in msg.sources() {
        let title = if source.title.is_empty() {
            &source.uri
        } else {
            &source.title
        };
        println!("  - {title} <{}>", source.uri);
    }
}

fn print_quiz(msg: &Message) {
    let Some(quiz) = msg.quiz() else {
        return;
    };
    for (n, question) in quiz.typed_questions().iter().enumerate() {
        println!("\n{}. {}", n + 1, question.question);
        for option in &question.options {
            println!("   - {option}");
        }
        println!("   Answer: {}", question.correct_answer);
        if let Some(explanation) = &question.explanation {
            println!("   {explanation}");
        }
    }
}

fn print_modes(current: Mode) {
    for mode in Mode::ALL {
        let marker = if mode == current { '*' } else { ' ' };
        println!("{marker} {:<10} {}", mode.slug(), mode.config().display_name);
    }
}

fn prompt(assistant: &Assistant) {
    print!("{}> ", assistant.mode().slug());
    let _ = std::io::stdout().flush();
}

fn main() -> anyhow::Result<()> {
    // Environment is loaded before the runtime spawns its workers.
    config::load_dotenv();
    let settings = Settings::from_env();
    logging::init(&settings);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(settings))
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    let provider = SessionProvider::initialize(&settings);
    let mut assistant = Assistant::new(provider, Mode::Chat);
    if let Some(banner) = assistant.config_error() {
        eprintln!("{banner}");
    }
    for msg in assistant.timeline().messages() {
        print_message(msg);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt(&assistant);
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "/quit" {
            break;
        } else if line == "/modes" {
            print_modes(assistant.mode());
        } else if let Some(name) = line.strip_prefix("/mode ") {
            match name.parse::<Mode>() {
                Ok(mode) => {
                    assistant.set_mode(mode);
                    if let Some(msg) = assistant.timeline().last() {
                        print_message(msg);
                    }
                }
                Err(err) => eprintln!("{err}"),
            }
        } else {
            let mut printer = ReplyPrinter::default();
            let outcome = assistant
                .send_message_with(line, |msg| printer.update(msg))
                .await;
            match outcome {
                TurnOutcome::Ignored => {}
                TurnOutcome::Completed(id) | TurnOutcome::Failed(id) => {
                    println!();
                    if let Some(msg) = assistant.timeline().get(id) {
                        print_sources(msg);
                        print_quiz(msg);
                    }
                }
                TurnOutcome::Aborted(id) => {
                    if let Some(msg) = assistant.timeline().get(id) {
                        print_message(msg);
                    }
                }
            }
            if let Some(banner) = assistant.config_error() {
                eprintln!("{banner}");
            }
        }
        prompt(&assistant);
    }

    Ok(())
}
