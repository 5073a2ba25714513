use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};

use quizfeed::model::{Question, StreamResult, DEFAULT_DIFFICULTY, DIFFICULTY_LEVELS};
use quizfeed::quiz::{SubjectFilter, Tick, DEFAULT_SECONDS_PER_QUESTION};
use quizfeed::telemetry::init_tracing;
use quizfeed::{Config, QuestionFeed, QuizClient, QuizSession, TrailingLine};

/// Terminal client for the streaming quiz service.
#[derive(Debug, Parser)]
#[command(name = "quizfeed", version, about)]
struct Cli {
    /// Quiz service base URL (default: $QUIZFEED_API_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Fail a stream that sends nothing for this many seconds
    #[arg(long, global = true)]
    idle_timeout: Option<u64>,

    /// Parse an unterminated last line instead of discarding it
    #[arg(long, global = true)]
    parse_trailing: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print questions as NDJSON while they stream in
    Stream(FetchArgs),
    /// Fetch questions in one response and print them
    Batch(FetchArgs),
    /// Send a message to the tutor chat
    Chat {
        /// Message text
        message: String,
    },
    /// Play a timed quiz in the terminal
    Play(PlayArgs),
}

#[derive(Debug, Args)]
struct FetchArgs {
    /// Number of questions to request
    #[arg(short = 'n', long, default_value_t = 20)]
    count: u32,

    /// easy, medium, hard, or very hard
    #[arg(short, long, default_value = DEFAULT_DIFFICULTY)]
    difficulty: String,
}

#[derive(Debug, Args)]
struct PlayArgs {
    #[command(flatten)]
    fetch: FetchArgs,

    /// Only ask questions from this math subject
    #[arg(short, long)]
    subject: Option<String>,

    /// Seconds allowed per question
    #[arg(short, long, default_value_t = DEFAULT_SECONDS_PER_QUESTION)]
    time: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing("quizfeed=info", cli.log_json);

    let mut config = Config::from_env()?;
    if let Some(base_url) = cli.base_url {
        config.transport.base_url = base_url;
    }
    if let Some(secs) = cli.idle_timeout {
        config.feed.idle_timeout = Some(Duration::from_secs(secs));
    }
    if cli.parse_trailing {
        config.feed.trailing_line = TrailingLine::Parse;
    }

    let client = QuizClient::new(config.transport.clone())?;

    let difficulty = match &cli.command {
        Commands::Stream(args) | Commands::Batch(args) => Some(&args.difficulty),
        Commands::Play(args) => Some(&args.fetch.difficulty),
        Commands::Chat { .. } => None,
    };
    if let Some(difficulty) = difficulty.filter(|d| !DIFFICULTY_LEVELS.contains(&d.as_str())) {
        tracing::warn!(%difficulty, known = ?DIFFICULTY_LEVELS, "unknown difficulty, sending it anyway");
    }

    match cli.command {
        Commands::Stream(args) => {
            let request = client.stream_request(args.count, &args.difficulty)?;
            let records = client.stream_questions(&request, config.feed.trailing_line).await?;
            futures::pin_mut!(records);
            while let Some(record) = records.next().await {
                println!("{}", record?);
            }
        }
        Commands::Batch(args) => {
            let records = client.fetch_batch(args.count, &args.difficulty).await?;
            for question in records.iter().filter_map(|r| Question::from_record(r).ok()) {
                print_question(&question);
                println!("   answer: {}\n", question.answer);
            }
        }
        Commands::Chat { message } => {
            let reply = client.chat(&message).await?;
            println!("{}", reply);
        }
        Commands::Play(args) => play(client, config, args).await?,
    }

    Ok(())
}

async fn play(client: QuizClient, config: Config, args: PlayArgs) -> Result<()> {
    let request = client.stream_request(args.fetch.count, &args.fetch.difficulty)?;
    let mut feed = QuestionFeed::new(client, config.feed);
    let mut updates = feed.subscribe();
    feed.request(request);

    let mut quiz = QuizSession::new(args.time);
    if let Some(subject) = &args.subject {
        quiz.set_filter(SubjectFilter::from(subject.as_str()));
    }
    let mut seen = 0;
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    loop {
        absorb(&mut quiz, &updates.borrow_and_update(), &mut seen);

        let Some(question) = quiz.current().cloned() else {
            if quiz.is_completed() || !updates.borrow().is_loading {
                break;
            }
            if updates.changed().await.is_err() {
                break;
            }
            continue;
        };

        println!("\nQuestion {} ({}s)", quiz.index() + 1, quiz.remaining());
        print_question(&question);

        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.tick().await;
        loop {
            tokio::select! {
                line = input.next_line() => {
                    let Some(line) = line.context("reading answer from stdin")? else {
                        return Ok(());
                    };
                    let line = line.trim();
                    if line.is_empty() {
                        println!("Pick a choice number or letter.");
                        continue;
                    }
                    quiz.select(pick_choice(&question, line));
                    match quiz.submit() {
                        Some(true) => println!("Correct!"),
                        _ => println!("Incorrect, the answer is {}.", question.answer),
                    }
                    break;
                }
                _ = ticker.tick() => match quiz.tick() {
                    Tick::Expired { .. } => {
                        println!("Time's up! The answer is {}.", question.answer);
                        break;
                    }
                    Tick::Running(left) if left % 10 == 0 => println!("{}s left", left),
                    _ => {}
                },
            }
        }

        // Hold the last loaded question open until the stream delivers more.
        while quiz.index() + 1 >= quiz.len() && updates.borrow().is_loading {
            if updates.changed().await.is_err() {
                break;
            }
            absorb(&mut quiz, &updates.borrow_and_update(), &mut seen);
        }
        quiz.next();
    }

    println!("\nScore: {}/{}", quiz.score(), quiz.len());
    if let Some(error) = feed.snapshot().error {
        eprintln!("Question stream ended early: {}", error);
    }
    Ok(())
}

fn absorb(quiz: &mut QuizSession, state: &StreamResult, seen: &mut usize) {
    if state.records.len() <= *seen {
        return;
    }
    let fresh = state.records[*seen..].iter().filter_map(|record| {
        Question::from_record(record)
            .map_err(|e| tracing::warn!(error = %e, "record is not a question"))
            .ok()
    });
    quiz.extend(fresh);
    *seen = state.records.len();
}

/// Accept a 1-based choice number or a choice letter.
fn pick_choice(question: &Question, input: &str) -> String {
    input
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| question.answer_choice_list.iter().nth(i).cloned())
        .unwrap_or_else(|| input.to_uppercase())
}

fn print_question(question: &Question) {
    println!("[{}] {}", question.math_subject, question.question);
    for (i, choice) in question.answer_choice_list.iter().enumerate() {
        println!("  {}. {}", i + 1, choice);
    }
}
