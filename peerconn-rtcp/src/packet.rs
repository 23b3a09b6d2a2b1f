use bytes::{Bytes, BytesMut};
use shared::error::{Error, Result};

use crate::goodbye::Goodbye;
use crate::header::{
    Header, PacketType, FORMAT_FIR, FORMAT_PLI, FORMAT_TCC, FORMAT_TLN, HEADER_LENGTH,
};
use crate::payload_feedbacks::full_intra_request::FullIntraRequest;
use crate::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use crate::receiver_report::ReceiverReport;
use crate::sender_report::SenderReport;
use crate::source_description::SourceDescription;
use crate::transport_feedbacks::transport_layer_cc::TransportLayerCc;
use crate::transport_feedbacks::transport_layer_nack::TransportLayerNack;

/// Any RTCP packet this stack understands. APP/XR and unhandled feedback
/// formats are preserved as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    SenderReport(SenderReport),
    ReceiverReport(ReceiverReport),
    SourceDescription(SourceDescription),
    Goodbye(Goodbye),
    PictureLossIndication(PictureLossIndication),
    FullIntraRequest(FullIntraRequest),
    TransportLayerNack(TransportLayerNack),
    TransportLayerCc(TransportLayerCc),
    Raw(Bytes),
}

impl Packet {
    pub fn marshal(&self) -> Result<Bytes> {
        match self {
            Packet::SenderReport(p) => p.marshal(),
            Packet::ReceiverReport(p) => p.marshal(),
            Packet::SourceDescription(p) => p.marshal(),
            Packet::Goodbye(p) => p.marshal(),
            Packet::PictureLossIndication(p) => p.marshal(),
            Packet::FullIntraRequest(p) => p.marshal(),
            Packet::TransportLayerNack(p) => p.marshal(),
            Packet::TransportLayerCc(p) => p.marshal(),
            Packet::Raw(raw) => Ok(raw.clone()),
        }
    }

    /// Parses a single packet from the start of `raw` (which must be exactly
    /// the packet, as sliced by [unmarshal_compound]).
    fn unmarshal(raw: &[u8]) -> Result<Self> {
        let h = Header::unmarshal(raw)?;
        Ok(match (h.packet_type, h.count) {
            (PacketType::SenderReport, _) => Packet::SenderReport(SenderReport::unmarshal(raw)?),
            (PacketType::ReceiverReport, _) => {
                Packet::ReceiverReport(ReceiverReport::unmarshal(raw)?)
            }
            (PacketType::SourceDescription, _) => {
                Packet::SourceDescription(SourceDescription::unmarshal(raw)?)
            }
            (PacketType::Goodbye, _) => Packet::Goodbye(Goodbye::unmarshal(raw)?),
            (PacketType::PayloadSpecificFeedback, FORMAT_PLI) => {
                Packet::PictureLossIndication(PictureLossIndication::unmarshal(raw)?)
            }
            (PacketType::PayloadSpecificFeedback, FORMAT_FIR) => {
                Packet::FullIntraRequest(FullIntraRequest::unmarshal(raw)?)
            }
            (PacketType::TransportSpecificFeedback, FORMAT_TLN) => {
                Packet::TransportLayerNack(TransportLayerNack::unmarshal(raw)?)
            }
            (PacketType::TransportSpecificFeedback, FORMAT_TCC) => {
                Packet::TransportLayerCc(TransportLayerCc::unmarshal(raw)?)
            }
            _ => Packet::Raw(Bytes::copy_from_slice(raw)),
        })
    }
}

/// Parses a compound RTCP datagram into its constituent packets.
pub fn unmarshal_compound(mut raw: &[u8]) -> Result<Vec<Packet>> {
    let mut packets = vec![];
    while !raw.is_empty() {
        let h = Header::unmarshal(raw)?;
        let len = HEADER_LENGTH + h.length as usize * 4;
        if raw.len() < len {
            return Err(Error::PacketTooShort);
        }
        packets.push(Packet::unmarshal(&raw[..len])?);
        raw = &raw[len..];
    }
    if packets.is_empty() {
        return Err(Error::EmptyCompound);
    }
    Ok(packets)
}

/// Marshals packets back-to-back into one compound datagram. The first packet
/// must be an SR or RR per RFC 3550 section 6.1.
pub fn marshal_compound(packets: &[Packet]) -> Result<Bytes> {
    match packets.first() {
        None => return Err(Error::EmptyCompound),
        Some(Packet::SenderReport(_)) | Some(Packet::ReceiverReport(_)) => {}
        Some(_) => return Err(Error::BadFirstPacket),
    }

    let mut buf = BytesMut::new();
    for p in packets {
        buf.extend_from_slice(&p.marshal()?);
    }
    Ok(buf.freeze())
}

#[cfg(test)]
mod packet_test {
    use super::*;
    use crate::reception_report::ReceptionReport;

    #[test]
    fn test_compound_roundtrip() {
        let packets = vec![
            Packet::ReceiverReport(ReceiverReport {
                ssrc: 0x1111,
                reports: vec![ReceptionReport {
                    ssrc: 0x2222,
                    ..Default::default()
                }],
            }),
            Packet::SourceDescription(SourceDescription::with_cname(0x1111, "cname")),
            Packet::Goodbye(Goodbye {
                sources: vec![0x1111],
                reason: String::new(),
            }),
        ];
        let raw = marshal_compound(&packets).expect("marshal");
        let parsed = unmarshal_compound(&raw).expect("unmarshal");
        assert_eq!(parsed, packets);
    }

    #[test]
    fn test_compound_must_start_with_report() {
        let packets = vec![Packet::Goodbye(Goodbye::default())];
        assert_eq!(marshal_compound(&packets), Err(Error::BadFirstPacket));
    }

    #[test]
    fn test_unknown_type_in_compound() {
        let rr = ReceiverReport {
            ssrc: 1,
            reports: vec![],
        }
        .marshal()
        .unwrap();
        let mut raw = rr.to_vec();
        raw.extend_from_slice(&[0x81, 0xbf, 0x00, 0x01, 0, 0, 0, 0]); // pt=191
        assert_eq!(
            unmarshal_compound(&raw),
            Err(Error::ErrUnknownRtcpPacketType(191))
        );
    }

    #[test]
    fn test_feedback_dispatch() {
        let pli = Packet::PictureLossIndication(PictureLossIndication {
            sender_ssrc: 1,
            media_ssrc: 2,
        });
        let raw = pli.marshal().unwrap();
        let parsed = unmarshal_compound(&raw).unwrap();
        assert_eq!(parsed, vec![pli]);
    }

    #[test]
    fn test_truncated_compound() {
        let rr = ReceiverReport {
            ssrc: 1,
            reports: vec![ReceptionReport::default()],
        }
        .marshal()
        .unwrap();
        assert_eq!(
            unmarshal_compound(&rr[..rr.len() - 4]),
            Err(Error::PacketTooShort)
        );
    }
}
