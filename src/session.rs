use crate::config::IngestSettings;
use crate::error::{Error, InputErrorSubcode, Result};
use crate::message::{Message, PrefixSection, StateMsg, UpdateMsg};
use crate::registry::Registry;
use crate::table::Session;
use foundations::telemetry::log;
use ipnet::{IpNet, Ipv4Net};
use std::sync::Arc;

/// What a single feed line turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processed {
    State,
    Update {
        announced: usize,
        withdrawn: usize,
        /// Withdrawals of prefixes the neighbor never announced.
        unknown: usize,
    },
    /// Undecodable line or a message type that carries no routing data.
    Ignored,
}

/// Turns decoded feed messages into neighbor RIB operations.
pub struct Translator {
    registry: Arc<Registry>,
    settings: IngestSettings,
}

impl Translator {
    pub fn new(registry: Arc<Registry>, settings: IngestSettings) -> Translator {
        Translator { registry, settings }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    /// Lines that do not decode are dropped without a trace. The only error
    /// returned is a malformed prefix, in which case nothing from the line
    /// has been applied.
    pub fn process_line(&self, line: &str) -> Result<Processed> {
        match Message::decode(line) {
            Ok(msg) => self.process(msg),
            Err(_) => Ok(Processed::Ignored),
        }
    }

    pub fn process(&self, msg: Message) -> Result<Processed> {
        match msg {
            Message::State(msg) => {
                self.process_state(msg);
                Ok(Processed::State)
            }
            Message::Update(msg) => self.process_update(msg),
            Message::Other(_) => Ok(Processed::Ignored),
        }
    }

    fn process_state(&self, msg: StateMsg) {
        log::info!("Neighbor state change";
            "neighbor" => %msg.neighbor,
            "state" => %msg.state
        );
        self.registry.set_state(&msg.neighbor, msg.state);
    }

    fn process_update(&self, msg: UpdateMsg) -> Result<Processed> {
        let announce = parse_section(&msg.neighbor, msg.announce.as_ref())?;
        let withdraw = parse_section(&msg.neighbor, msg.withdraw.as_ref())?;

        let neighbor = self.registry.get_or_create(&msg.neighbor);
        let mut session = neighbor.write();

        // Every leaf counts as an update, including the IPv6 ones that never
        // reach the RIB.
        for _ in 0..announce.skipped + withdraw.skipped {
            self.count_update(neighbor.ip(), &mut session);
        }

        // The AS path is an attribute of the message, so every announced
        // prefix shares the same one.
        for prefix in &announce.prefixes {
            self.count_update(neighbor.ip(), &mut session);
            session.rib.announce(*prefix, msg.as_path.clone());
        }

        let mut unknown = 0;
        for prefix in &withdraw.prefixes {
            self.count_update(neighbor.ip(), &mut session);
            if session.rib.withdraw(prefix).is_none() {
                unknown += 1;
                log::warn!("Could not find withdrawn prefix";
                    "neighbor" => %neighbor.ip(),
                    "prefix" => %prefix
                );
            }
        }

        Ok(Processed::Update {
            announced: announce.prefixes.len(),
            withdrawn: withdraw.prefixes.len() - unknown,
            unknown,
        })
    }

    fn count_update(&self, ip: &str, session: &mut Session) {
        let updates = session.increment_updates();
        let interval = self.settings.progress_interval;
        if interval > 0 && updates % interval == 0 {
            log::info!("Processed {} updates", updates; "neighbor" => %ip);
        }
    }
}

#[derive(Debug, Default)]
struct ParsedSection {
    prefixes: Vec<Ipv4Net>,
    // IPv6 leaves, counted but not applied.
    skipped: u64,
}

fn parse_section(neighbor: &str, section: Option<&PrefixSection>) -> Result<ParsedSection> {
    let mut parsed = ParsedSection::default();
    for (afi, _, prefix) in section.into_iter().flat_map(|s| s.prefixes()) {
        match prefix.parse::<IpNet>() {
            Ok(IpNet::V4(net)) => parsed.prefixes.push(net.trunc()),
            Ok(IpNet::V6(_)) => {
                parsed.skipped += 1;
                log::debug!("Skipping IPv6 prefix";
                    "neighbor" => %neighbor,
                    "afi" => %afi,
                    "prefix" => %prefix
                );
            }
            Err(e) => {
                log::error!("Could not parse prefix";
                    "neighbor" => %neighbor,
                    "prefix" => %prefix,
                    "error" => %e
                );
                return Error::err_input(InputErrorSubcode::MalformedPrefix, Some(prefix.to_string()));
            }
        }
    }
    Ok(parsed)
}
