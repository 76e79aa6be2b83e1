use derive_more::Display;

/// Process exit codes understood by the launcher script on the device.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
#[repr(u8)]
pub enum ReturnCode {
    /// Nothing left to do.
    #[display("success")]
    Success = 0,
    /// Run again once Nickel has imported the new books.
    #[display("rerun")]
    Rerun = 1,
    /// Calibre rejected every configured password.
    #[display("password error")]
    PasswordError = 100,
    #[display("error")]
    Error = 250,
}

impl ReturnCode {
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// What the final flush left behind.
#[derive(Clone, Copy, Debug, Display, Default, PartialEq, Eq)]
pub enum Outcome {
    #[default]
    #[display("no action")]
    NoAction,
    /// Some metadata will only reach the catalog on a later run.
    #[display("rerun required")]
    RerunRequired,
}

/// How the Calibre connection ended, as reported by the protocol driver.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SessionEnd {
    /// Calibre disconnected normally, or there was no connection at all.
    #[default]
    Completed,
    /// No Calibre instance answered on the network.
    CalibreNotFound,
    /// Calibre asked for a password and none of ours were accepted.
    PasswordRejected,
    /// The connection failed for some other reason.
    Failed(String),
}

/// The session's final word: the flush outcome plus how the connection
/// ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Summary {
    pub outcome: Outcome,
    pub end: SessionEnd,
}

impl Summary {
    pub fn return_code(&self) -> ReturnCode {
        match (&self.end, self.outcome) {
            (SessionEnd::PasswordRejected, _) => ReturnCode::PasswordError,
            (SessionEnd::CalibreNotFound | SessionEnd::Failed(_), _) => ReturnCode::Error,
            (SessionEnd::Completed, Outcome::RerunRequired) => ReturnCode::Rerun,
            (SessionEnd::Completed, Outcome::NoAction) => ReturnCode::Success,
        }
    }

    /// Message shown on the device's screen.
    pub fn status(&self) -> String {
        match (&self.end, self.outcome) {
            (SessionEnd::PasswordRejected, _) => "No valid password found!".to_string(),
            (SessionEnd::CalibreNotFound, _) => {
                "Calibre not found!\nHave you enabled the Calibre Wireless service?".to_string()
            },
            (SessionEnd::Failed(reason), _) => format!("Something went wrong: {reason}"),
            (SessionEnd::Completed, Outcome::RerunRequired) => {
                "nickelsync will restart automatically to update metadata".to_string()
            },
            (SessionEnd::Completed, Outcome::NoAction) => "Nothing more to do!\n\nReturning to Home screen".to_string(),
        }
    }
}
