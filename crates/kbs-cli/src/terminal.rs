//! Line-oriented client for interactive consultations.

use std::io::{BufRead, Write};

use kbs_core::{Client, ClientError, Prompt, Question};

/// Prints prompts to `output` and reads answers from `input`.
///
/// An answer may be the option's number or its label. Anything else is asked
/// again, so the engine only ever sees valid labels from a terminal.
pub struct TerminalClient<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> TerminalClient<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn show(&mut self, prompt: &Prompt) -> std::io::Result<()> {
        writeln!(self.output, "{prompt}")?;
        for picture in prompt.pictures() {
            writeln!(self.output, "  [picture: {picture}]")?;
        }
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, ClientError> {
        let mut line = String::new();
        let read = self.input.read_line(&mut line).map_err(io_error)?;
        if read == 0 {
            return Err(ClientError::Failed("input closed".to_string()));
        }
        Ok(line.trim().to_string())
    }
}

impl<R: BufRead, W: Write> Client for TerminalClient<R, W> {
    fn write(&mut self, message: &Prompt) -> Result<(), ClientError> {
        self.show(message).map_err(io_error)?;
        self.output.flush().map_err(io_error)
    }

    fn query(&mut self, question: &Question) -> Result<String, ClientError> {
        self.show(&question.prompt).map_err(io_error)?;
        for (index, label) in question.options.iter().enumerate() {
            writeln!(self.output, "  {}) {label}", index + 1).map_err(io_error)?;
        }

        loop {
            write!(self.output, "> ").map_err(io_error)?;
            self.output.flush().map_err(io_error)?;

            let reply = self.read_line()?;
            if let Some(label) = choose(&question.options, &reply) {
                return Ok(label.to_string());
            }
            writeln!(self.output, "Please answer with one of: {}", question.options.join(", "))
                .map_err(io_error)?;
        }
    }
}

fn choose<'a>(options: &'a [String], reply: &str) -> Option<&'a str> {
    if let Ok(number) = reply.parse::<usize>() {
        return number
            .checked_sub(1)
            .and_then(|index| options.get(index))
            .map(String::as_str);
    }
    options
        .iter()
        .find(|label| label.eq_ignore_ascii_case(reply))
        .map(String::as_str)
}

fn io_error(err: std::io::Error) -> ClientError {
    ClientError::Failed(err.to_string())
}
