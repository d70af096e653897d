use std::collections::HashSet;

use tracing::warn;

use crate::dto::events::NodeRewardSpec;

/// One discrete position on the shared race board.
#[derive(Debug, Clone)]
pub struct Node {
    /// Position of the node in the board sequence.
    pub index: usize,
    /// Currency credited when a player lands here.
    pub reward_amount: i64,
    /// Whether landing here interrupts movement with a story beat.
    pub is_story_node: bool,
    /// Players currently standing on this node.
    pub occupants: HashSet<String>,
}

/// Static-per-race sequence of nodes plus occupancy tracking.
///
/// Node 0 is synthetic: the server never sends it, every race starts there and
/// it carries no reward. The final node is the terminal/bonus node regardless
/// of its nominal reward value.
#[derive(Debug, Clone, Default)]
pub struct Board {
    nodes: Vec<Node>,
}

impl Board {
    /// Build the board from the server's ordered reward list.
    ///
    /// `total_nodes` is what the server announced; when the reward list yields
    /// more nodes the board self-corrects upward rather than truncating data,
    /// and when it yields fewer the gap is padded with zero-reward nodes.
    pub fn from_rewards(total_nodes: usize, reward_specs: &[NodeRewardSpec]) -> Self {
        let mut nodes = Vec::with_capacity(total_nodes.max(reward_specs.len() + 1));
        nodes.push(Node {
            index: 0,
            reward_amount: 0,
            is_story_node: false,
            occupants: HashSet::new(),
        });

        for spec in reward_specs {
            nodes.push(Node {
                index: nodes.len(),
                reward_amount: spec.reward,
                is_story_node: spec.is_story,
                occupants: HashSet::new(),
            });
        }

        if nodes.len() > total_nodes {
            warn!(
                announced = total_nodes,
                actual = nodes.len(),
                "reward list exceeds announced node count, widening board"
            );
        }

        while nodes.len() < total_nodes {
            warn!(
                announced = total_nodes,
                actual = nodes.len(),
                "reward list shorter than announced node count, padding"
            );
            nodes.push(Node {
                index: nodes.len(),
                reward_amount: 0,
                is_story_node: false,
                occupants: HashSet::new(),
            });
        }

        Self { nodes }
    }

    /// Number of nodes on the board, synthetic start included.
    pub fn total_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Node at `index`, if within the board.
    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    /// Whether `index` is the terminal/bonus node.
    pub fn is_terminal(&self, index: usize) -> bool {
        !self.nodes.is_empty() && index == self.nodes.len() - 1
    }

    /// Whether landing on `index` triggers a story presentation.
    pub fn is_story_node(&self, index: usize) -> bool {
        self.nodes
            .get(index)
            .map(|node| node.is_story_node)
            .unwrap_or(false)
    }

    /// Place `player_id` on node 0 (used when a race starts).
    pub fn place_at_start(&mut self, player_id: &str) {
        if let Some(start) = self.nodes.first_mut() {
            start.occupants.insert(player_id.to_string());
        }
    }

    /// Move `player_id` between occupancy sets.
    ///
    /// The removal and insertion happen together so a player never appears on
    /// two nodes at once.
    pub fn move_occupant(&mut self, player_id: &str, from: usize, to: usize) {
        if let Some(old) = self.nodes.get_mut(from) {
            old.occupants.remove(player_id);
        }
        match self.nodes.get_mut(to) {
            Some(new) => {
                new.occupants.insert(player_id.to_string());
            }
            None => warn!(player_id, to, "occupancy move targets a node outside the board"),
        }
    }
}
