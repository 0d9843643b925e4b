//! Interactive prompts on stdin/stdout
//!
//! `Confirm` is the seam used by destructive dashboard operations; the
//! line-reading helpers are shared with the setup wizard.

use anyhow::Result;
use std::io::{self, Write};

/// Asks the operator before a state-changing command is dispatched
pub trait Confirm: Send + Sync {
    fn confirm(&self, question: &str) -> bool;
}

impl<C: Confirm + ?Sized> Confirm for Box<C> {
    fn confirm(&self, question: &str) -> bool {
        (**self).confirm(question)
    }
}

/// Confirmation read from the terminal, defaulting to "no"
pub struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(&self, question: &str) -> bool {
        prompt_yes_no(question, false).unwrap_or(false)
    }
}

/// Same answer to every question (`--yes`, scripted runs, tests)
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl Confirm for FixedAnswer {
    fn confirm(&self, _question: &str) -> bool {
        self.0
    }
}

fn read_line() -> Result<String> {
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

pub fn prompt_with_default(prompt: &str, default: &str) -> Result<String> {
    print!("❓ {} [{}]: ", prompt, default);
    io::stdout().flush()?;

    let input = read_line()?;
    if input.is_empty() {
        Ok(default.to_string())
    } else {
        Ok(input)
    }
}

pub fn prompt_with_default_parse<T: std::str::FromStr>(prompt: &str, default: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    loop {
        let input = prompt_with_default(prompt, default)?;
        match input.parse::<T>() {
            Ok(value) => return Ok(value),
            Err(e) => println!("❌ Invalid input: {}. Please try again.", e),
        }
    }
}

pub fn prompt_optional(prompt: &str) -> Result<Option<String>> {
    print!("❓ {}: ", prompt);
    io::stdout().flush()?;

    let input = read_line()?;
    Ok(if input.is_empty() { None } else { Some(input) })
}

/// Optional typed answer; re-asks until the input is empty or parses
pub fn prompt_optional_parse<T: std::str::FromStr>(prompt: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    loop {
        let input = prompt_optional(prompt)?;
        match parse_optional::<T>(input.as_deref()) {
            Ok(value) => return Ok(value),
            Err(e) => println!("❌ Invalid input: {}. Please try again.", e),
        }
    }
}

fn parse_optional<T: std::str::FromStr>(
    input: Option<&str>,
) -> std::result::Result<Option<T>, T::Err> {
    input.map(str::parse::<T>).transpose()
}

pub fn prompt_yes_no(prompt: &str, default: bool) -> Result<bool> {
    let default_str = if default { "Y/n" } else { "y/N" };

    loop {
        print!("❓ {} [{}]: ", prompt, default_str);
        io::stdout().flush()?;

        let input = read_line()?.to_lowercase();
        if input.is_empty() {
            return Ok(default);
        }

        match input.as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => println!("❌ Please enter 'y' or 'n'."),
        }
    }
}

pub fn prompt_password(prompt: &str) -> Result<Option<String>> {
    println!("⚠️  WARNING: Password input will be visible on screen.");
    print!("🔐 {}: ", prompt);
    io::stdout().flush()?;

    let input = read_line()?;
    Ok(if input.is_empty() { None } else { Some(input) })
}
