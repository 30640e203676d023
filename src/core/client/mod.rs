// ─── Client Liaison ───
// Talks to the locally running game client: liveness via the process table,
// restart via its authenticated loopback API.

mod liaison;

pub use liaison::{ClientLiaison, ClientSession, CredentialSource, ProcessCredentialSource};

/// Image name of the client UI process.
pub const CLIENT_IMAGE: &str = "LeagueClientUx.exe";
