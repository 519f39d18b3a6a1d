//! Course changes planned by each observer.
//!
//! The engine has no decision-making of its own. Each tick, a seeded share
//! of observers plans one [`Steer`] command against its own record; the
//! plan goes through a sandbox and is then committed.

use lightcone_plan::Command;
use lightcone_types::{
    AgentId, AgentRecord, CommandErrorMessage, Int4D, LocalizableString, NamedCheck,
    UniverseSettings, Velocity,
};

/// Set an agent's velocity. Only an agent may steer itself.
#[derive(Debug, Clone, Copy)]
pub struct Steer {
    agent: AgentId,
    velocity: Velocity,
}

impl Steer {
    /// Steer `agent` onto `velocity`.
    pub const fn new(agent: AgentId, velocity: Velocity) -> Self {
        Self { agent, velocity }
    }
}

impl Command for Steer {
    fn name(&self) -> &str {
        "steer"
    }

    fn target_id(&self) -> AgentId {
        self.agent
    }

    fn self_check_and_execute(
        &self,
        _observer: &mut AgentRecord,
        settings: &UniverseSettings,
    ) -> CommandErrorMessage {
        if self.velocity.magnitude() > settings.speed_of_light {
            return CommandErrorMessage::failure(LocalizableString::with_args(
                "steer.faster_than_light",
                [format!("{:.3}", self.velocity.magnitude())],
            ));
        }
        CommandErrorMessage::ok()
    }

    fn check_and_execute(
        &self,
        target: &mut AgentRecord,
        from: AgentId,
        _from_coordinate: Int4D,
        _settings: &UniverseSettings,
    ) -> CommandErrorMessage {
        let result = CommandErrorMessage::from_checks([NamedCheck::new(
            "steer.self_only",
            from == target.id,
        )]);
        if result.success {
            target.set_velocity(self.velocity);
        }
        result
    }
}
