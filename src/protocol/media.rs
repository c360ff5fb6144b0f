//! # Media Descriptors and Negotiation
//!
//! The client's `open` message offers a list of media parameter sets; the
//! server picks the first one it is willing to accept. This module holds the
//! static table of accepted parameter sets and the matching logic.
//!
//! ## Accepted Audio Format:
//! - **Format**: PCMU (mu-law companded, 8-bit)
//! - **Sample Rate**: 8kHz (narrow-band telephony)
//! - **Channels**: `external` (caller), `internal` (agent), or both

use serde::{Deserialize, Serialize};

/// Sample rate accepted for negotiated streams.
pub const ACCEPTED_RATE: u32 = 8000;

/// Descriptor patterns (format, rate) the server is willing to accept.
const ACCEPTED: &[(MediaFormat, u32)] = &[(MediaFormat::Pcmu, ACCEPTED_RATE)];

/// Top-level media type. The protocol only defines audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Audio,
}

/// Audio encoding offered by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaFormat {
    #[serde(rename = "PCMU")]
    Pcmu,
    #[serde(rename = "L16")]
    L16,
}

/// A stream channel: which side of the call the samples come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaChannel {
    /// Agent side of the call
    Internal,
    /// Caller side of the call
    External,
}

/// One media parameter set as carried in `open`/`opened` messages.
///
/// Immutable for the session's lifetime once negotiated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub format: MediaFormat,
    pub channels: Vec<MediaChannel>,
    pub rate: u32,
}

impl MediaDescriptor {
    /// Channel count for the finalized container: stereo only when both the
    /// internal and external channels were negotiated.
    pub fn channel_count(&self) -> u16 {
        if self.channels.contains(&MediaChannel::Internal)
            && self.channels.contains(&MediaChannel::External)
        {
            2
        } else {
            1
        }
    }
}

/// How strictly the channel layout of an offer is matched.
///
/// Two historical deployments disagreed on this: one accepted any channel
/// set (including mono), the other required the offer to carry both call
/// sides. Both behaviors are kept behind this configuration knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelPolicy {
    /// Accept any non-empty channel set
    Any,
    /// Require the offer to include both `internal` and `external`
    Both,
}

impl Default for ChannelPolicy {
    fn default() -> Self {
        ChannelPolicy::Any
    }
}

/// Pick the first offered descriptor the server accepts, if any.
pub fn select_offered_media(
    offered: &[MediaDescriptor],
    policy: ChannelPolicy,
) -> Option<&MediaDescriptor> {
    offered.iter().find(|m| is_accepted(m, policy))
}

fn is_accepted(offer: &MediaDescriptor, policy: ChannelPolicy) -> bool {
    if offer.media_type != MediaType::Audio {
        return false;
    }
    if !ACCEPTED
        .iter()
        .any(|(format, rate)| *format == offer.format && *rate == offer.rate)
    {
        return false;
    }
    match policy {
        ChannelPolicy::Any => !offer.channels.is_empty(),
        ChannelPolicy::Both => {
            offer.channels.contains(&MediaChannel::Internal)
                && offer.channels.contains(&MediaChannel::External)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(format: MediaFormat, rate: u32, channels: Vec<MediaChannel>) -> MediaDescriptor {
        MediaDescriptor {
            media_type: MediaType::Audio,
            format,
            channels,
            rate,
        }
    }

    #[test]
    fn test_accepts_pcmu_8k() {
        let offered = vec![descriptor(
            MediaFormat::Pcmu,
            8000,
            vec![MediaChannel::External],
        )];
        let selected = select_offered_media(&offered, ChannelPolicy::Any);
        assert_eq!(selected, Some(&offered[0]));
    }

    #[test]
    fn test_rejects_l16_and_wrong_rate() {
        let offered = vec![
            descriptor(MediaFormat::L16, 8000, vec![MediaChannel::External]),
            descriptor(MediaFormat::Pcmu, 16000, vec![MediaChannel::External]),
        ];
        assert!(select_offered_media(&offered, ChannelPolicy::Any).is_none());
    }

    #[test]
    fn test_skips_unsupported_offers_to_find_match() {
        let offered = vec![
            descriptor(MediaFormat::L16, 8000, vec![MediaChannel::External]),
            descriptor(MediaFormat::Pcmu, 8000, vec![MediaChannel::External]),
        ];
        let selected = select_offered_media(&offered, ChannelPolicy::Any);
        assert_eq!(selected, Some(&offered[1]));
    }

    #[test]
    fn test_both_policy_requires_both_channels() {
        let mono = vec![descriptor(
            MediaFormat::Pcmu,
            8000,
            vec![MediaChannel::External],
        )];
        let stereo = vec![descriptor(
            MediaFormat::Pcmu,
            8000,
            vec![MediaChannel::External, MediaChannel::Internal],
        )];
        assert!(select_offered_media(&mono, ChannelPolicy::Both).is_none());
        assert!(select_offered_media(&stereo, ChannelPolicy::Both).is_some());
        // mono is still fine under the relaxed policy
        assert!(select_offered_media(&mono, ChannelPolicy::Any).is_some());
    }

    #[test]
    fn test_empty_channel_set_is_never_accepted() {
        let offered = vec![descriptor(MediaFormat::Pcmu, 8000, vec![])];
        assert!(select_offered_media(&offered, ChannelPolicy::Any).is_none());
    }

    #[test]
    fn test_channel_count() {
        let stereo = descriptor(
            MediaFormat::Pcmu,
            8000,
            vec![MediaChannel::External, MediaChannel::Internal],
        );
        let mono = descriptor(MediaFormat::Pcmu, 8000, vec![MediaChannel::Internal]);
        assert_eq!(stereo.channel_count(), 2);
        assert_eq!(mono.channel_count(), 1);
    }

    #[test]
    fn test_descriptor_wire_names() {
        let json = serde_json::to_value(descriptor(
            MediaFormat::Pcmu,
            8000,
            vec![MediaChannel::External, MediaChannel::Internal],
        ))
        .unwrap();
        assert_eq!(json["type"], "audio");
        assert_eq!(json["format"], "PCMU");
        assert_eq!(json["channels"][0], "external");
        assert_eq!(json["channels"][1], "internal");
        assert_eq!(json["rate"], 8000);
    }
}
