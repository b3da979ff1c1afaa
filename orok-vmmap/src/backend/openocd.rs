//! OpenOCD TCL RPC back end.
//!
//! Commands are sent as text terminated by `0x1A`; OpenOCD answers with
//! the command's output, also terminated by `0x1A`. The connection is
//! driven by a private current-thread runtime so that callers (the
//! walker in particular) stay synchronous.

use std::time::Duration;

use orok_ttable::{MemoryReader, RegisterReader, SystemRegister, parse_hex};
use tokio::{
	io::{AsyncReadExt, AsyncWriteExt},
	net::TcpStream,
	runtime::Runtime,
};

/// The default OpenOCD TCL RPC port.
pub const DEFAULT_PORT: u16 = 6666;
/// Terminates every command and response.
const COMMAND_TOKEN: u8 = 0x1A;
/// How long to wait for a single response.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// An error returned when talking to OpenOCD.
#[derive(Debug, thiserror::Error)]
pub enum OpenOcdError {
	/// The I/O runtime could not be created.
	#[error("failed to start I/O runtime: {0}")]
	Runtime(#[source] std::io::Error),
	/// The TCP connection could not be established.
	#[error("failed to connect to OpenOCD at {addr}: {source}")]
	Connect {
		/// The address that was dialed.
		addr:   String,
		/// The underlying error.
		#[source]
		source: std::io::Error,
	},
	/// The connection failed mid-command.
	#[error("I/O error talking to OpenOCD: {0}")]
	Io(#[from] std::io::Error),
	/// No (complete) response arrived in time.
	#[error("OpenOCD did not respond within {0:?}")]
	Timeout(Duration),
	/// OpenOCD closed the connection.
	#[error("OpenOCD closed the connection")]
	Closed,
	/// An earlier command was abandoned mid-exchange, so the stream can no
	/// longer be trusted to line up responses with commands.
	#[error("OpenOCD connection abandoned after an earlier failure; reconnect to continue")]
	Poisoned,
	/// The response couldn't be understood.
	#[error("unexpected response to `{command}`: {response:?}")]
	Protocol {
		/// The command that was sent.
		command:  String,
		/// What came back.
		response: String,
	},
}

/// A connection to OpenOCD's TCL RPC server.
pub struct OpenOcd {
	/// The RPC connection. Dropped before the runtime driving it.
	stream:   TcpStream,
	/// Drives `stream`.
	runtime:  Runtime,
	/// Whether memory reads use physical addresses.
	phys:     bool,
	/// Per-command response timeout.
	timeout:  Duration,
	/// Set once an exchange fails part way; a late reply may still be
	/// in flight.
	poisoned: bool,
}

impl OpenOcd {
	/// Connects to OpenOCD at `addr` (`HOST[:PORT]`, port defaulting to
	/// [`DEFAULT_PORT`]).
	///
	/// If `phys` is set, memory is read by physical address; otherwise by
	/// virtual address in the target's current translation regime.
	pub fn connect(addr: &str, phys: bool) -> Result<Self, OpenOcdError> {
		let runtime = tokio::runtime::Builder::new_current_thread()
			.enable_all()
			.build()
			.map_err(OpenOcdError::Runtime)?;

		let addr = if addr.contains(':') {
			addr.to_string()
		} else {
			format!("{addr}:{DEFAULT_PORT}")
		};

		let stream = runtime
			.block_on(TcpStream::connect(&addr))
			.map_err(|source| OpenOcdError::Connect {
				addr: addr.clone(),
				source,
			})?;
		stream.set_nodelay(true)?;

		log::debug!("connected to OpenOCD at {addr}");

		Ok(Self {
			stream,
			runtime,
			phys,
			timeout:  DEFAULT_TIMEOUT,
			poisoned: false,
		})
	}

	/// Overrides the per-command response timeout.
	#[must_use]
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}

	/// Sends a command, returning its (trimmed) output.
	///
	/// If the exchange fails part way (timeout, I/O error, closed
	/// connection), every later command fails with
	/// [`OpenOcdError::Poisoned`].
	pub fn send(&mut self, command: &str) -> Result<String, OpenOcdError> {
		if self.poisoned {
			return Err(OpenOcdError::Poisoned);
		}

		log::trace!("openocd <- {command}");

		let Self {
			stream,
			runtime,
			timeout,
			..
		} = self;
		let timeout = *timeout;

		let response = runtime.block_on(async {
			tokio::time::timeout(timeout, exchange(stream, command))
				.await
				.map_err(|_| OpenOcdError::Timeout(timeout))?
		});

		match response {
			Ok(response) => {
				log::trace!("openocd -> {response}");
				Ok(response)
			}
			Err(err) => {
				log::debug!("abandoning OpenOCD connection: {err}");
				self.poisoned = true;
				Err(err)
			}
		}
	}

	/// Builds a protocol error for `command`.
	fn protocol_error(command: String, response: String) -> OpenOcdError {
		OpenOcdError::Protocol { command, response }
	}
}

impl Drop for OpenOcd {
	fn drop(&mut self) {
		if self.poisoned {
			return;
		}

		if let Err(err) = self.send("exit") {
			log::debug!("failed to close OpenOCD session cleanly: {err}");
		}
	}
}

impl MemoryReader for OpenOcd {
	type Error = OpenOcdError;

	fn read_words(&mut self, address: u64, count: u32) -> Result<Vec<u64>, Self::Error> {
		let command = format!(
			"read_memory {address:#x} 64 {count}{}",
			if self.phys { " phys" } else { "" }
		);
		let response = self.send(&command)?;
		parse_words(&response).ok_or_else(|| Self::protocol_error(command, response))
	}
}

impl RegisterReader for OpenOcd {
	type Error = OpenOcdError;

	fn read_register(&mut self, register: SystemRegister) -> Result<u64, Self::Error> {
		let enc = register.encoding();
		let command = format!(
			"aarch64 mrs {} {} {} {} {}",
			enc.op0, enc.op1, enc.crn, enc.crm, enc.op2
		);
		let response = self.send(&command)?;
		parse_register(&response).ok_or_else(|| Self::protocol_error(command, response))
	}
}

/// Sends one command and collects the response up to the terminator.
async fn exchange(stream: &mut TcpStream, command: &str) -> Result<String, OpenOcdError> {
	let mut request = Vec::with_capacity(command.len() + 1);
	request.extend_from_slice(command.as_bytes());
	request.push(COMMAND_TOKEN);
	stream.write_all(&request).await?;

	let mut response = Vec::new();
	let mut buf = vec![0_u8; 4096];

	loop {
		let n = stream.read(&mut buf).await?;
		if n == 0 {
			return Err(OpenOcdError::Closed);
		}

		response.extend_from_slice(&buf[..n]);

		if let Some(end) = response.iter().position(|&b| b == COMMAND_TOKEN) {
			response.truncate(end);
			break;
		}
	}

	Ok(String::from_utf8_lossy(&response).trim().to_string())
}

/// Parses the whitespace separated hex words returned by `read_memory`.
///
/// The word count is not checked here; the walker rejects short reads.
fn parse_words(response: &str) -> Option<Vec<u64>> {
	response
		.split_whitespace()
		.map(|word| parse_hex(word).ok())
		.collect()
}

/// Parses the output of `aarch64 mrs`, which is either the bare value or
/// `<name>: <value>`.
fn parse_register(response: &str) -> Option<u64> {
	let value = response
		.rsplit_once(": ")
		.map_or(response, |(_, value)| value);
	parse_hex(value).ok()
}

#[cfg(test)]
pub(crate) mod tests {
	use std::{
		io::{Read, Write},
		net::TcpListener,
		thread,
	};

	use orok_ttable::{WalkConfig, walk};

	use super::*;

	/// Serves a single connection, answering each command with `respond`
	/// until `exit` or EOF. Returns the address and the received commands.
	pub fn fake_openocd(
		respond: impl Fn(&str) -> String + Send + 'static,
	) -> (String, thread::JoinHandle<Vec<String>>) {
		let listener = TcpListener::bind("127.0.0.1:0").unwrap();
		let addr = listener.local_addr().unwrap().to_string();

		let handle = thread::spawn(move || {
			let (mut socket, _) = listener.accept().unwrap();
			let mut commands = Vec::new();
			let mut pending = Vec::new();
			let mut buf = [0_u8; 1024];

			loop {
				// A client that hangs up with a reply still unread resets
				// the connection rather than closing it.
				let n = match socket.read(&mut buf) {
					Ok(0) | Err(_) => break,
					Ok(n) => n,
				};
				pending.extend_from_slice(&buf[..n]);

				while let Some(end) = pending.iter().position(|&b| b == COMMAND_TOKEN) {
					let command = String::from_utf8(pending.drain(..=end).collect()).unwrap();
					let command = command.trim_end_matches(char::from(COMMAND_TOKEN)).to_string();
					let mut reply = respond(&command).into_bytes();
					reply.push(COMMAND_TOKEN);
					if socket.write_all(&reply).is_err() {
						return commands;
					}
					let exit = command == "exit";
					commands.push(command);
					if exit {
						return commands;
					}
				}
			}

			commands
		});

		(addr, handle)
	}

	/// Answers `read_memory` from a table at 0x1000 whose slot 3 maps a
	/// 1GiB block, and `mrs` with fixed register values.
	fn respond(command: &str) -> String {
		let parts = command.split_whitespace().collect::<Vec<_>>();
		match parts.as_slice() {
			["read_memory", "0x1000", "64", count, ..] => {
				let count = count.parse::<usize>().unwrap();
				(0..count)
					.map(|i| {
						if i == 3 {
							"0xc0000701".to_string()
						} else {
							"0x0".to_string()
						}
					})
					.collect::<Vec<_>>()
					.join(" ")
			}
			["aarch64", "mrs", "3", "0", "10", "2", "0"] => "MAIR_EL1: 0xff04".to_string(),
			["aarch64", "mrs", "3", "0", "2", "0", "0"] => "0x0000000000001001".to_string(),
			_ => String::new(),
		}
	}

	#[test]
	fn response_parsing() {
		assert_eq!(parse_words("0x1 0x2\n0xff"), Some(vec![1, 2, 0xFF]));
		assert_eq!(parse_words(""), Some(vec![]));
		assert_eq!(parse_words("0x1 error"), None);
		assert_eq!(parse_register("MAIR_EL1: 0x44ff"), Some(0x44FF));
		assert_eq!(parse_register("0x1000"), Some(0x1000));
		assert_eq!(parse_register("invalid command"), None);
	}

	#[test]
	fn walks_through_openocd() {
		let (addr, server) = fake_openocd(respond);

		{
			let mut ocd = OpenOcd::connect(&addr, true).unwrap();
			let config = WalkConfig::new(1, 0).unwrap();
			let tree = walk(0x1000, &config, &mut ocd).unwrap();
			assert_eq!(tree.translate(0xC000_0010), Some(0xC000_0010));

			assert_eq!(ocd.read_register(SystemRegister::MairEl1).unwrap(), 0xFF04);
			assert_eq!(
				SystemRegister::Ttbr0El1.read(&mut ocd).unwrap(),
				0x1001
			);
		}

		let commands = server.join().unwrap();
		assert_eq!(commands[0], "read_memory 0x1000 64 512 phys");
		assert_eq!(commands[1], "aarch64 mrs 3 0 10 2 0");
		assert_eq!(commands.last().map(String::as_str), Some("exit"));
	}

	#[test]
	fn late_replies_are_never_mistaken_for_later_ones() {
		let (addr, server) = fake_openocd(|command| {
			match command {
				"read_memory 0x1000 64 1 phys" => {
					thread::sleep(Duration::from_millis(300));
					"0x1111".to_string()
				}
				"read_memory 0x2000 64 1 phys" => "0x2222".to_string(),
				_ => String::new(),
			}
		});

		{
			let mut ocd = OpenOcd::connect(&addr, true)
				.unwrap()
				.with_timeout(Duration::from_millis(100));

			assert!(matches!(
				ocd.read_words(0x1000, 1),
				Err(OpenOcdError::Timeout(_))
			));
			thread::sleep(Duration::from_millis(400));
			assert!(matches!(
				ocd.read_words(0x2000, 1),
				Err(OpenOcdError::Poisoned)
			));
		}

		// The second command (and `exit`) never reached the server.
		let commands = server.join().unwrap();
		assert_eq!(commands, vec!["read_memory 0x1000 64 1 phys".to_string()]);
	}

	#[test]
	fn malformed_responses_are_protocol_errors() {
		let (addr, server) = fake_openocd(|_| "Error: target not halted".to_string());

		{
			let mut ocd = OpenOcd::connect(&addr, false).unwrap();
			let err = ocd.read_words(0x2000, 1).unwrap_err();
			assert!(matches!(
				err,
				OpenOcdError::Protocol { ref command, .. } if command == "read_memory 0x2000 64 1"
			));
		}

		server.join().unwrap();
	}

	#[test]
	fn connection_failures_name_the_address() {
		// Bind then drop to get a port that (very likely) refuses connections.
		let addr = {
			let listener = TcpListener::bind("127.0.0.1:0").unwrap();
			listener.local_addr().unwrap().to_string()
		};
		let Err(err) = OpenOcd::connect(&addr, true) else {
			panic!("connection to {addr} should have failed");
		};
		assert!(matches!(err, OpenOcdError::Connect { addr: ref a, .. } if *a == addr));
	}
}
