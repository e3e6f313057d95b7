//! Typed events of the ovs module, as assembled from the raw sections on
//! the consuming side.

use serde::{Deserialize, Serialize};

/// Event generated by the ovs datapath probes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum OvsEvent {
    /// The datapath executed an action on a packet.
    #[serde(rename = "action_execute")]
    Action {
        #[serde(flatten)]
        action_execute: ActionEvent,
    },

    /// A packet was enqueued on a userspace delivery queue.
    #[serde(rename = "upcall_enqueue")]
    UpcallEnqueue {
        #[serde(flatten)]
        upcall_enqueue: UpcallEnqueueEvent,
    },
}

/// OVS action execution event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionEvent {
    /// Name of the executed action, from enum ovs_action_attr.
    pub action: String,
    /// Recirculation id of the packet when the action ran.
    pub recirc_id: u32,
    /// Fingerprint of the packet, present when the execution was triggered
    /// by an in-flight userspace command. Matches the queue id reported by
    /// the enqueue side for the same packet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_id: Option<u32>,
    /// Destination port, present for output actions only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u32>,
}

/// Upcall enqueue event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UpcallEnqueueEvent {
    /// Return value of the enqueue operation. Zero or positive on success,
    /// a negative kernel error code otherwise (a failed enqueue usually
    /// means a packet drop).
    pub ret: i32,
    /// Upcall command. Holds OVS_PACKET_CMD:
    ///   OVS_PACKET_CMD_UNSPEC   = 0
    ///   OVS_PACKET_CMD_MISS     = 1
    ///   OVS_PACKET_CMD_ACTION   = 2
    ///   OVS_PACKET_CMD_EXECUTE  = 3
    pub cmd: u8,
    /// Destination port id of the userspace queue.
    pub port: u32,
}

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, Result};
    use serde_json::Value;

    use super::*;

    fn events() -> Vec<(&'static str, OvsEvent)> {
        vec![
            (
                r#"{"event_type":"action_execute","action":"output","recirc_id":0,"queue_id":1337,"port":2}"#,
                OvsEvent::Action {
                    action_execute: ActionEvent {
                        action: "output".to_string(),
                        recirc_id: 0,
                        queue_id: Some(1337),
                        port: Some(2),
                    },
                },
            ),
            (
                r#"{"event_type":"action_execute","action":"drop","recirc_id":4}"#,
                OvsEvent::Action {
                    action_execute: ActionEvent {
                        action: "drop".to_string(),
                        recirc_id: 4,
                        queue_id: None,
                        port: None,
                    },
                },
            ),
            (
                r#"{"event_type":"upcall_enqueue","ret":-16,"cmd":3,"port":7}"#,
                OvsEvent::UpcallEnqueue {
                    upcall_enqueue: UpcallEnqueueEvent {
                        ret: -16,
                        cmd: 3,
                        port: 7,
                    },
                },
            ),
        ]
    }

    #[test]
    fn event_to_json() -> Result<()> {
        for (event_json, event) in events().iter() {
            let json = serde_json::to_string(event)
                .map_err(|e| anyhow!("Failed to convert event {event:?} to json: {e}"))?;
            // Comparing json strings is error prone. Convert them to Values
            // and compare those.
            assert_eq!(
                serde_json::from_str::<Value>(json.as_str()).unwrap(),
                serde_json::from_str::<Value>(event_json).unwrap()
            );
        }
        Ok(())
    }

    #[test]
    fn json_to_event() -> Result<()> {
        for (event_json, event) in events().iter() {
            let parsed: OvsEvent = serde_json::from_str(event_json)
                .map_err(|e| anyhow!("Failed to convert json '{event_json}' to event: {e}"))?;
            assert_eq!(&parsed, event);
        }
        Ok(())
    }
}
