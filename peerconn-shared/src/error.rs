#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    //RTP errors
    #[error("RTP header size insufficient")]
    ErrHeaderSizeInsufficient,
    #[error("RTP header size insufficient for extension")]
    ErrHeaderSizeInsufficientForExtension,
    #[error("buffer too small")]
    ErrBufferTooSmall,
    #[error("extension not enabled")]
    ErrHeaderExtensionsNotEnabled,
    #[error("extension not found")]
    ErrHeaderExtensionNotFound,
    #[error("header extension id must be between 1 and 14 for RFC 5285 one byte extensions")]
    ErrRfc8285OneByteHeaderIdRange,
    #[error("header extension payload must be 16 bytes or less for RFC 5285 one byte extensions")]
    ErrRfc8285OneByteHeaderSize,
    #[error("packet is not large enough")]
    ErrShortPacket,
    #[error("RED block length exceeds remaining payload")]
    ErrShortRedBlock,
    #[error("too many spatial layers")]
    ErrTooManySpatialLayers,
    #[error("invalid scalability mode")]
    ErrInvalidScalabilityMode,

    //RTCP errors
    /// Wrong marshal size.
    #[error("Wrong marshal size")]
    WrongMarshalSize,
    /// Packet lost exceeds maximum amount of packets
    /// that can possibly be lost.
    #[error("Invalid total lost count")]
    InvalidTotalLost,
    /// Packet contains an invalid header.
    #[error("Invalid header")]
    InvalidHeader,
    /// Packet contains empty compound.
    #[error("Empty compound packet")]
    EmptyCompound,
    /// Invalid first packet in compound packets. First packet
    /// should either be a SenderReport packet or ReceiverReport
    #[error("First packet in compound must be SR or RR")]
    BadFirstPacket,
    /// Too many reports.
    #[error("Too many reports")]
    TooManyReports,
    /// Packet received is too short.
    #[error("Packet too short to be read")]
    PacketTooShort,
    /// Wrong packet type.
    #[error("Wrong packet type")]
    WrongType,
    /// SDES received is too long.
    #[error("SDES must be < 255 octets long")]
    SdesTextTooLong,
    /// Reason is too long.
    #[error("Reason must be < 255 octets long")]
    ReasonTooLong,
    /// Invalid packet version.
    #[error("Invalid packet version")]
    BadVersion,
    /// Invalid padding value.
    #[error("Invalid padding value")]
    WrongPadding,
    /// Wrong feedback message type.
    #[error("Wrong feedback message type")]
    WrongFeedbackType,
    /// Wrong payload type.
    #[error("Wrong payload type")]
    WrongPayloadType,
    /// Packet status chunk is not 2 bytes.
    #[error("Packet status chunk must be 2 bytes")]
    PacketStatusChunkLength,
    #[error("Delta exceed limit")]
    DeltaExceedLimit,
    /// RTCP packet type is not in the assigned range.
    #[error("unknown rtcp packet type {0}")]
    ErrUnknownRtcpPacketType(u8),

    //SRTP errors
    #[error("duplicated packet")]
    ErrDuplicated,
    #[error("SRTP master key is not long enough")]
    ErrShortSrtpMasterKey,
    #[error("SRTP master salt is not long enough")]
    ErrShortSrtpMasterSalt,
    #[error("no such SRTP Profile")]
    ErrNoSuchSrtpProfile,
    #[error("failed to verify auth tag")]
    ErrFailedToVerifyAuthTag,
    #[error("packet is too short to be RTP packet")]
    ErrTooShortRtp,
    #[error("packet is too short to be RTCP packet")]
    ErrTooShortRtcp,
    #[error("exceeded the maximum number of packets")]
    ErrExceededMaxPackets,
    #[error("srtp ssrc={0} index={1}: duplicated")]
    SrtpSsrcDuplicated(u32, u16),
    #[error("srtcp ssrc={0} index={1}: duplicated")]
    SrtcpSsrcDuplicated(u32, usize),
    #[error("too short SRTP packet: only {0} bytes, expected > {1} bytes")]
    SrtpTooSmall(usize, usize),
    #[error("too short SRTCP packet: only {0} bytes, expected > {1} bytes")]
    SrtcpTooSmall(usize, usize),
    #[error("failed to verify rtp auth tag")]
    RtpFailedToVerifyAuthTag,
    #[error("failed to verify rtcp auth tag")]
    RtcpFailedToVerifyAuthTag,

    //STUN errors
    #[error("attribute not found")]
    ErrAttributeNotFound,
    #[error("unexpected EOF")]
    ErrUnexpectedEof,
    #[error("attribute size is invalid")]
    ErrAttributeSizeInvalid,
    #[error("unexpected EOF: not enough bytes to read header")]
    ErrUnexpectedHeaderEof,
    #[error("integrity check failed")]
    ErrIntegrityMismatch,
    #[error("fingerprint check failed")]
    ErrFingerprintMismatch,
    #[error("invalid length of IP value")]
    ErrBadIpLength,
    #[error("unhandled STUN packet")]
    ErrUnhandledStunPacket,
    #[error("non-STUN message from a remote candidate")]
    ErrNonStunMessage,
    #[error("unexpected STUN request message")]
    ErrUnexpectedStunRequestMessage,

    // ICE errors
    /// Indicates an error with Unknown info.
    #[error("Unknown type")]
    ErrUnknownType,
    /// Indicates malformed port is provided.
    #[error("url parse: invalid port number")]
    ErrPort,
    /// Indicates an unsupported transport type was provided.
    #[error("invalid transport protocol type")]
    ErrProtoType,
    /// Indicates an unknown ice server scheme was provided.
    #[error("unknown scheme type")]
    ErrSchemeType,
    /// Indicates an invalid hostname was provided.
    #[error("invalid hostname")]
    ErrHost,
    /// Indicates local username fragment insufficient bits are provided.
    /// Have to be at least 24 bits long.
    #[error("local username fragment is less than 24 bits long")]
    ErrLocalUfragInsufficientBits,
    /// Indicates local password insufficient bits are provided.
    /// Have to be at least 128 bits long.
    #[error("local password is less than 128 bits long")]
    ErrLocalPwdInsufficientBits,
    /// Indicates agent does not have a valid candidate pair.
    #[error("no candidate pairs available")]
    ErrNoCandidatePairs,
    /// Indicates agent was started with an empty remote ufrag.
    #[error("remote ufrag is empty")]
    ErrRemoteUfragEmpty,
    /// Indicates agent was started with an empty remote pwd.
    #[error("remote pwd is empty")]
    ErrRemotePwdEmpty,
    /// Indicates that non host candidates were selected for a lite agent.
    #[error("lite agents must only use host candidates")]
    ErrLiteUsingNonHostCandidates,
    /// Indicates that one or more URL was provided to the agent but no host
    /// candidate required them.
    #[error("agent does not need URL with selected candidate types")]
    ErrUselessUrlsProvided,
    /// Indicates mdns is not available to resolve a .local candidate.
    #[error("mdns is not supported")]
    ErrMulticastDnsNotSupported,
    #[error("username mismatch")]
    ErrMismatchUsername,
    #[error("attribute not long enough to be ICE candidate")]
    ErrAttributeTooShortIceCandidate,
    #[error("could not parse component")]
    ErrParseComponent,
    #[error("could not parse priority")]
    ErrParsePriority,
    #[error("could not parse port")]
    ErrParsePort,
    #[error("could not parse related addresses")]
    ErrParseRelatedAddr,
    #[error("could not parse type")]
    ErrParseType,
    #[error("unknown candidate type")]
    ErrUnknownCandidateType,
    #[error("failed to parse address")]
    ErrAddressParseFailed,
    #[error("username is empty")]
    ErrUsernameEmpty,
    #[error("password is empty")]
    ErrPasswordEmpty,

    // DTLS errors
    #[error("conn is closed")]
    ErrConnClosed,
    #[error("packet is too short")]
    ErrDtlsPacketInvalidLength,
    #[error("invalid content type")]
    ErrInvalidContentType,
    #[error("packet length and declared length do not match")]
    ErrInvalidPacketLength,
    #[error("handshake is in progress")]
    ErrHandshakeInProgress,
    #[error("handshake retransmission exhausted")]
    ErrHandshakeTimeout,
    #[error("client+server do not support any shared cipher suites")]
    ErrCipherSuiteNoIntersection,
    #[error("server hello can not be created without a cipher suite")]
    ErrCipherSuiteUnset,
    #[error("server responded with SRTP Profile we do not support")]
    ErrClientNoMatchingSrtpProfile,
    #[error("client requested SRTP but we have no matching profiles")]
    ErrServerNoMatchingSrtpProfile,
    #[error("client+server cookie does not match")]
    ErrCookieMismatch,
    #[error("cookie must not be longer then 255 bytes")]
    ErrCookieTooLong,
    #[error("invalid or unknown cipher suite")]
    ErrInvalidCipherSuite,
    #[error("unable to determine if ClientKeyExchange is a public key or PSK Identity")]
    ErrInvalidClientKeyExchange,
    #[error("invalid or unknown compression method")]
    ErrInvalidCompressionMethod,
    #[error("invalid or unknown elliptic curve type")]
    ErrInvalidEllipticCurveType,
    #[error("invalid named curve")]
    ErrInvalidNamedCurve,
    #[error("no certificate provided")]
    ErrInvalidCertificate,
    #[error("invalid hash algorithm")]
    ErrInvalidHashAlgorithm,
    #[error("invalid signature algorithm")]
    ErrInvalidSignatureAlgorithm,
    #[error("expected and actual key signature do not match")]
    ErrKeySignatureMismatch,
    #[error("connection can not be created, no CipherSuites satisfy this Config")]
    ErrNoAvailableCipherSuites,
    #[error("no certificates configured")]
    ErrNoCertificates,
    #[error("client requested zero or more elliptic curves that are not supported by the server")]
    ErrNoSupportedEllipticCurves,
    #[error("unsupported protocol version")]
    ErrUnsupportedProtocolVersion,
    #[error("SRTP support was requested but server did not respond with use_srtp extension")]
    ErrRequestedButNoSrtpExtension,
    #[error("Certificate is mandatory for server")]
    ErrServerMustHaveCertificate,
    #[error("client required Extended Master Secret extension, but server does not support it")]
    ErrClientRequiredButNoServerEms,
    #[error(
        "server requires the Extended Master Secret extension, but the client does not support it"
    )]
    ErrServerRequiredButNoClientEms,
    #[error("expected and actual verify data does not match")]
    ErrVerifyDataMismatch,
    #[error("invalid state machine transition")]
    ErrInvalidFsmTransition,
    #[error("ApplicationData with epoch of 0")]
    ErrApplicationDataEpochZero,
    #[error("unhandled contentType")]
    ErrUnhandledContentType,
    #[error("empty fragment")]
    ErrEmptyFragment,
    #[error("Alert is Fatal or Close Notify")]
    ErrAlertFatalOrClose,
    #[error("sequence number overflow")]
    ErrSequenceNumberOverflow,
    #[error("data length and declared length do not match")]
    ErrLengthMismatch,
    #[error(
        "Fragment buffer overflow. New size {new_size} is greater than specified max {max_size}"
    )]
    ErrFragmentBufferOverflow { new_size: usize, max_size: usize },
    /// The remote [`SocketAddr`] supplied was malformed
    #[error("invalid remote address: {0}")]
    InvalidRemoteAddress(SocketAddr),
    /// No server configuration was set up
    #[error("no server config")]
    NoServerConfig,

    //ExportKeyingMaterial errors
    #[error("tls handshake is in progress")]
    HandshakeInProgress,
    #[error("context is not supported for export_keying_material")]
    ContextUnsupported,
    #[error("export_keying_material can not be used with a reserved label")]
    ReservedExportKeyingMaterial,
    #[error("no cipher suite for export_keying_material")]
    CipherSuiteUnset,
    #[error("export_keying_material hash: {0}")]
    Hash(String),

    //SDP errors
    #[error("SdpInvalidSyntax: {0}")]
    SdpInvalidSyntax(String),
    #[error("SdpInvalidValue: {0}")]
    SdpInvalidValue(String),

    //RTC
    /// ErrConnectionClosed indicates an operation executed after connection
    /// has already been closed.
    #[error("connection closed")]
    ErrConnectionClosed,
    /// ErrDataChannelClosed indicates an operation executed when the data
    /// channel is not (yet) open or closed.
    #[error("data channel closed")]
    ErrDataChannelClosed,
    /// ErrCertificateExpired indicates that an x509 certificate has expired.
    #[error("x509Cert expired")]
    ErrCertificateExpired,
    /// ErrExistingTrack indicates that a track already exists.
    #[error("track already exists")]
    ErrExistingTrack,
    /// ErrCodecNotFound is returned when a codec search fails.
    #[error("codec not found")]
    ErrCodecNotFound,
    /// ErrNoRemoteDescription indicates that an operation was rejected because
    /// the remote description is not set.
    #[error("remote description is not set")]
    ErrNoRemoteDescription,
    /// ErrIncorrectSignalingState indicates that the signaling state of
    /// PeerConnection is not correct for the requested operation.
    #[error("operation can not be run in current signaling state")]
    ErrIncorrectSignalingState,
    /// ErrSignalingStateCannotRollback indicates a rollback was attempted
    /// from the stable state.
    #[error("can't rollback from stable state")]
    ErrSignalingStateCannotRollback,
    /// ErrSignalingStateProposedTransitionInvalid indicates a transition not
    /// in the W3C state table.
    #[error("invalid proposed signaling state transition: {0}")]
    ErrSignalingStateProposedTransitionInvalid(String),
    /// ErrSessionDescriptionNoFingerprint indicates set_remote_description was
    /// called with a SessionDescription that has no fingerprint.
    #[error("set_remote_description called with no fingerprint")]
    ErrSessionDescriptionNoFingerprint,
    /// ErrSessionDescriptionInvalidFingerprint indicates set_remote_description
    /// was called with a SessionDescription that has an invalid fingerprint.
    #[error("set_remote_description called with an invalid fingerprint")]
    ErrSessionDescriptionInvalidFingerprint,
    /// ErrSessionDescriptionMissingIceUfrag indicates set_remote_description
    /// was called with a SessionDescription that is missing an ice-ufrag value.
    #[error("set_remote_description called with no ice-ufrag")]
    ErrSessionDescriptionMissingIceUfrag,
    /// ErrSessionDescriptionMissingIcePwd indicates set_remote_description was
    /// called with a SessionDescription that is missing an ice-pwd value.
    #[error("set_remote_description called with no ice-pwd")]
    ErrSessionDescriptionMissingIcePwd,

    #[error("io error: {0}")]
    Io(String),
    #[error("{0}")]
    Other(String),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
