//! Console command parsing
//!
//! Lines that are not console commands are handed to the simulator as
//! injected events.

/// One line typed at the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Quit,
    /// Query the backend status
    Status,
    Caps,
    /// Create an SPS flow: port, reserved bytes, optional event port
    Sps {
        port: u16,
        bytes: u32,
        event_port: Option<u16>,
    },
    /// Create an event flow on a port
    Event { port: u16 },
    /// Subscribe to Rx traffic on a port, optionally filtered by service ids
    Rx { port: u16, ids: Vec<u32> },
    /// Change the reservation of an SPS socket
    Reserve { sock: i32, bytes: u32 },
    Close { sock: i32 },
    /// Anything else goes to the simulator
    Inject(String),
}

pub const HELP: &str = "\
commands:
  status                      query the radio status
  caps                        print interface capabilities
  sps <port> <bytes> [event]  create an SPS flow (and an event flow)
  event <port>                create an event flow
  rx <port> [ids...]          subscribe to Rx traffic
  reserve <sock> <bytes>      change an SPS reservation, 0 closes it
  close <sock>                close a socket
  quit
anything else is injected into the simulator, e.g.
  cv2x_status active suspended 3
  sps_schedule 0 1700000000000 100";

impl Command {
    /// Parse a console line, `None` for a blank line
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut tokens = line.split_whitespace();
        let Some(keyword) = tokens.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = tokens.collect();

        let command = match keyword {
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            "status" => Command::Status,
            "caps" => Command::Caps,
            "sps" => Command::Sps {
                port: arg(&args, 0, "port")?,
                bytes: arg(&args, 1, "bytes")?,
                event_port: optional(&args, 2, "event port")?,
            },
            "event" => Command::Event {
                port: arg(&args, 0, "port")?,
            },
            "rx" => Command::Rx {
                port: arg(&args, 0, "port")?,
                ids: args[1.min(args.len())..]
                    .iter()
                    .map(|s| s.parse().map_err(|_| format!("invalid service id '{}'", s)))
                    .collect::<Result<_, _>>()?,
            },
            "reserve" => Command::Reserve {
                sock: arg(&args, 0, "socket")?,
                bytes: arg(&args, 1, "bytes")?,
            },
            "close" => Command::Close {
                sock: arg(&args, 0, "socket")?,
            },
            _ => Command::Inject(line.trim().to_string()),
        };
        Ok(Some(command))
    }
}

fn arg<T: std::str::FromStr>(args: &[&str], index: usize, what: &str) -> Result<T, String> {
    optional(args, index, what)?.ok_or_else(|| format!("missing {}", what))
}

fn optional<T: std::str::FromStr>(
    args: &[&str],
    index: usize,
    what: &str,
) -> Result<Option<T>, String> {
    args.get(index)
        .map(|s| s.parse().map_err(|_| format!("invalid {} '{}'", what, s)))
        .transpose()
}
