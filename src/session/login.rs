//! Login automaton.
//!
//! Drives a serial console from an unknown state to a logged-in, normalized
//! shell.
//!
//! # States
//!
//! ```text
//! Init → WaitingPrompt → CheckingLoginStatus ─┬→ AlreadyLoggedIn ─────┬→ InitialSetup → Ready
//!                                             └→ EnteringCredentials ─┘
//! ```
//!
//! Any failing step moves to `Failed` and surfaces one
//! [`Error::LoginFailed`] naming the step. Only the prompt wait retries;
//! everything else is the caller's call.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use chrono::Local;
use tracing::{debug, info, warn};

use crate::config::{LoginConfig, Timeouts};
use crate::error::{Error, Result};
use crate::executor::CommandExecutor;
use crate::protocol::{CommandRequest, ControlByte, Pattern, ShellCommand};

// ============================================================================
// Constants
// ============================================================================

/// Prompt-wait attempts before giving up.
pub const PROMPT_ATTEMPTS: u32 = 10;

/// Pause between prompt-wait attempts.
pub const PROMPT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Any console prompt ends in a colon: `login:`, `Password:`, `user@host:~ $`.
const CONSOLE_PROMPT: &str = ":";

/// Password prompt printed by `login`.
const PASSWORD_PROMPT: &str = "Password:";

/// Console login prompt, seen after `exit`.
pub(crate) const LOGIN_PROMPT: &str = "login:";

// ============================================================================
// LoginState
// ============================================================================

/// Step of the login automaton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoginState {
    /// Nothing sent yet.
    Init,
    /// Poking the console until something prompt-like answers.
    WaitingPrompt,
    /// Deciding whether the console is already a shell.
    CheckingLoginStatus,
    /// Console already at the shell prompt.
    AlreadyLoggedIn,
    /// Typing login id and password.
    EnteringCredentials,
    /// Normalizing history, timezone and clock.
    InitialSetup,
    /// Logged in and set up.
    Ready,
    /// Gave up.
    Failed,
}

impl LoginState {
    /// Returns `true` for `Ready` and `Failed`.
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::WaitingPrompt => "waiting-prompt",
            Self::CheckingLoginStatus => "checking-login-status",
            Self::AlreadyLoggedIn => "already-logged-in",
            Self::EnteringCredentials => "entering-credentials",
            Self::InitialSetup => "initial-setup",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// LoginOutcome
// ============================================================================

/// How a successful login got to the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The console was already at the shell prompt.
    AlreadyLoggedIn,
    /// Credentials were entered.
    Authenticated,
}

// ============================================================================
// LoginAutomaton
// ============================================================================

/// One run of the login sequence. Dropped when [`LoginAutomaton::run`] returns.
pub(crate) struct LoginAutomaton<'a> {
    /// Command executor on the open connection.
    executor: CommandExecutor<'a>,
    /// Credentials and prompt.
    config: &'a LoginConfig,
    /// Step deadlines.
    timeouts: &'a Timeouts,
    /// Current step.
    state: LoginState,
    /// Prompt-wait attempts made.
    attempts: u32,
    /// Output captured by the last prompt wait.
    captured: String,
    /// Set once the status check has decided.
    outcome: Option<LoginOutcome>,
}

impl<'a> LoginAutomaton<'a> {
    /// Creates an automaton in `Init`.
    pub(crate) fn new(
        executor: CommandExecutor<'a>,
        config: &'a LoginConfig,
        timeouts: &'a Timeouts,
    ) -> Self {
        Self {
            executor,
            config,
            timeouts,
            state: LoginState::Init,
            attempts: 0,
            captured: String::new(),
            outcome: None,
        }
    }

    /// Runs to `Ready` or `Failed`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LoginFailed`] carrying the failing step and cause.
    pub(crate) async fn run(mut self) -> Result<LoginOutcome> {
        while !self.state.is_terminal() {
            let stage = self.state;
            match self.step().await {
                Ok(next) => {
                    debug!(from = %stage, to = %next, "Login state transition");
                    self.state = next;
                }
                Err(e) => {
                    warn!(stage = %stage, error = %e, "Login failed");
                    self.state = LoginState::Failed;
                    return Err(Error::login_failed(stage, e));
                }
            }
        }

        let outcome = self.outcome.unwrap_or(LoginOutcome::Authenticated);
        info!(?outcome, attempts = self.attempts, "Login complete");
        Ok(outcome)
    }

    /// Performs the current step and returns the next state.
    async fn step(&mut self) -> Result<LoginState> {
        let next = match self.state {
            LoginState::Init => LoginState::WaitingPrompt,

            LoginState::WaitingPrompt => {
                self.captured = self.wait_for_prompt().await?;
                LoginState::CheckingLoginStatus
            }

            LoginState::CheckingLoginStatus => {
                if self.captured.contains(self.config.prompt.as_str()) {
                    self.outcome = Some(LoginOutcome::AlreadyLoggedIn);
                    LoginState::AlreadyLoggedIn
                } else {
                    self.outcome = Some(LoginOutcome::Authenticated);
                    LoginState::EnteringCredentials
                }
            }

            LoginState::AlreadyLoggedIn => LoginState::InitialSetup,

            LoginState::EnteringCredentials => {
                self.enter_credentials().await?;
                LoginState::InitialSetup
            }

            LoginState::InitialSetup => {
                self.initial_setup().await?;
                LoginState::Ready
            }

            state @ (LoginState::Ready | LoginState::Failed) => state,
        };
        Ok(next)
    }

    /// Interrupts whatever is running and waits for a prompt-like answer.
    ///
    /// The first colon only says the console is alive; reading goes on until
    /// a full shell, login or password prompt shows up, so `user@host:~ $`
    /// is not mistaken for a logged-out console.
    ///
    /// Only pattern timeouts are retried; a dropped transport fails at once.
    async fn wait_for_prompt(&mut self) -> Result<String> {
        let request = CommandRequest::expect("", CONSOLE_PROMPT, self.timeouts.prompt_wait())?;
        let settle = recognized_prompt(&self.config.prompt);

        loop {
            self.attempts += 1;
            self.executor.send_control(ControlByte::Interrupt).await?;

            let answer = self
                .executor
                .execute_settled(&request, &settle, self.timeouts.prompt_wait())
                .await;
            match answer {
                Ok(output) => {
                    debug!(attempt = self.attempts, "Console answered");
                    return Ok(output.into_text());
                }
                Err(e) if e.is_timeout() => {
                    debug!(attempt = self.attempts, "No prompt yet");
                    if self.attempts >= PROMPT_ATTEMPTS {
                        return Err(Error::PromptNotFound {
                            attempts: self.attempts,
                        });
                    }
                    tokio::time::sleep(PROMPT_RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Types the login id and password.
    async fn enter_credentials(&self) -> Result<()> {
        let login = CommandRequest::expect(
            self.config.login_id.as_str(),
            PASSWORD_PROMPT,
            self.timeouts.password_prompt(),
        )?;
        self.executor.execute(&login).await?;

        let password = CommandRequest::expect(
            self.config.password.as_str(),
            &self.config.prompt,
            self.timeouts.shell_prompt(),
        )?
        .sensitive();
        self.executor.execute(&password).await?;

        debug!(login_id = %self.config.login_id, "Credentials accepted");
        Ok(())
    }

    /// Normalizes the shell: history, timezone, clock.
    async fn initial_setup(&self) -> Result<()> {
        self.run_at_prompt(ShellCommand::HistoryControl).await?;

        if let Some(timezone) = self.config.effective_timezone() {
            self.run_at_prompt(ShellCommand::SetTimezone {
                timezone: timezone.to_string(),
            })
            .await?;
        }

        let at = Local::now().naive_local();
        self.run_at_prompt(ShellCommand::SetDate { at }).await?;
        Ok(())
    }

    /// Runs a setup command and waits for the prompt after its echo.
    async fn run_at_prompt(&self, command: ShellCommand) -> Result<()> {
        let line = command.to_line();
        let pattern = Pattern::after(&line, &self.config.prompt)?;
        let request = CommandRequest::new(line, pattern, self.timeouts.command());
        self.executor.execute(&request).await?;
        Ok(())
    }
}

/// Matches once the console shows a prompt the login flow can decide on.
fn recognized_prompt(shell_prompt: &str) -> Pattern {
    let shell_prompt = shell_prompt.to_string();
    Pattern::custom("shell, login or password prompt", move |buffer| {
        buffer.contains(shell_prompt.as_str())
            || buffer.contains(LOGIN_PROMPT)
            || buffer.contains(PASSWORD_PROMPT)
    })
}

// ============================================================================
// Tests
// ============================================================================
