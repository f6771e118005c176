//! ASF GUIDs and the registry of known object kinds.
//!
//! Every ASF object starts with a 16-byte GUID naming its type. On the wire
//! the first three fields are little-endian and the trailing eight bytes are
//! raw, so the in-memory form keeps the fields separate and compares them
//! structurally.

use std::fmt;

/// A 128-bit ASF identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Guid {
    pub const fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self {
            data1,
            data2,
            data3,
            data4,
        }
    }

    /// Decode the 16-byte wire form.
    pub fn from_bytes(b: [u8; 16]) -> Self {
        let mut data4 = [0u8; 8];
        data4.copy_from_slice(&b[8..16]);
        Self {
            data1: u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            data2: u16::from_le_bytes([b[4], b[5]]),
            data3: u16::from_le_bytes([b[6], b[7]]),
            data4,
        }
    }

    /// Encode to the 16-byte wire form.
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.data1.to_le_bytes());
        out[4..6].copy_from_slice(&self.data2.to_le_bytes());
        out[6..8].copy_from_slice(&self.data3.to_le_bytes());
        out[8..16].copy_from_slice(&self.data4);
        out
    }

    /// The object kind this GUID names, or [`ObjectKind::Error`].
    pub fn kind(&self) -> ObjectKind {
        ObjectKind::from_guid(self)
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.data4;
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            self.data1, self.data2, self.data3, d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]
        )
    }
}

#[cfg(feature = "serialize")]
impl serde::Serialize for Guid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

macro_rules! guid_registry {
    ($( $kind:ident, $konst:ident, $label:literal = $d1:literal, $d2:literal, $d3:literal, [$($d4:literal),*]; )*) => {
        impl Guid {
            $(
                pub const $konst: Guid = Guid::new($d1, $d2, $d3, [$($d4),*]);
            )*
        }

        /// Symbolic kind of a known ASF GUID.
        ///
        /// Discriminants are stable: `Error` is 0 and the known kinds follow
        /// in registry order.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serialize", derive(serde::Serialize))]
        pub enum ObjectKind {
            /// Sentinel for GUIDs not in the registry.
            Error,
            $( $kind, )*
        }

        impl ObjectKind {
            /// Number of entries including the sentinel.
            pub const COUNT: usize = ObjectKind::Compatibility as usize + 1;

            /// Resolve a GUID. Unknown values map to [`ObjectKind::Error`].
            pub fn from_guid(guid: &Guid) -> Self {
                match *guid {
                    $( Guid::$konst => ObjectKind::$kind, )*
                    _ => ObjectKind::Error,
                }
            }

            /// The GUID for this kind; `None` for the sentinel.
            pub fn guid(self) -> Option<Guid> {
                match self {
                    ObjectKind::Error => None,
                    $( ObjectKind::$kind => Some(Guid::$konst), )*
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    ObjectKind::Error => "error",
                    $( ObjectKind::$kind => $label, )*
                }
            }

            /// Stable registry index.
            pub fn index(self) -> usize {
                self as usize
            }
        }
    };
}

guid_registry! {
    // top level objects
    Header, HEADER, "header" = 0x75b22630, 0x668e, 0x11cf, [0xa6, 0xd9, 0x00, 0xaa, 0x00, 0x62, 0xce, 0x6c];
    Data, DATA, "data" = 0x75b22636, 0x668e, 0x11cf, [0xa6, 0xd9, 0x00, 0xaa, 0x00, 0x62, 0xce, 0x6c];
    SimpleIndex, SIMPLE_INDEX, "simple index" = 0x33000890, 0xe5b1, 0x11cf, [0x89, 0xf4, 0x00, 0xa0, 0xc9, 0x03, 0x49, 0xcb];
    Index, INDEX, "index" = 0xd6e229d3, 0x35da, 0x11d1, [0x90, 0x34, 0x00, 0xa0, 0xc9, 0x03, 0x49, 0xbe];
    MediaObjectIndex, MEDIA_OBJECT_INDEX, "media object index" = 0xfeb103f8, 0x12ad, 0x4c64, [0x84, 0x0f, 0x2a, 0x1d, 0x2f, 0x7a, 0xd4, 0x8c];
    TimecodeIndex, TIMECODE_INDEX, "timecode index" = 0x3cb73fd0, 0x0c4a, 0x4803, [0x95, 0x3d, 0xed, 0xf7, 0xb6, 0x22, 0x8f, 0x0c];

    // header objects
    FileProperties, FILE_PROPERTIES, "file properties" = 0x8cabdca1, 0xa947, 0x11cf, [0x8e, 0xe4, 0x00, 0xc0, 0x0c, 0x20, 0x53, 0x65];
    StreamProperties, STREAM_PROPERTIES, "stream properties" = 0xb7dc0791, 0xa9b7, 0x11cf, [0x8e, 0xe6, 0x00, 0xc0, 0x0c, 0x20, 0x53, 0x65];
    HeaderExtension, HEADER_EXTENSION, "header extension" = 0x5fbf03b5, 0xa92e, 0x11cf, [0x8e, 0xe3, 0x00, 0xc0, 0x0c, 0x20, 0x53, 0x65];
    CodecList, CODEC_LIST, "codec list" = 0x86d15240, 0x311d, 0x11d0, [0xa3, 0xa4, 0x00, 0xa0, 0xc9, 0x03, 0x48, 0xf6];
    ScriptCommand, SCRIPT_COMMAND, "script command" = 0x1efb1a30, 0x0b62, 0x11d0, [0xa3, 0x9b, 0x00, 0xa0, 0xc9, 0x03, 0x48, 0xf6];
    Marker, MARKER, "marker" = 0xf487cd01, 0xa951, 0x11cf, [0x8e, 0xe6, 0x00, 0xc0, 0x0c, 0x20, 0x53, 0x65];
    BitrateMutualExclusion, BITRATE_MUTUAL_EXCLUSION, "bitrate mutual exclusion" = 0xd6e229dc, 0x35da, 0x11d1, [0x90, 0x34, 0x00, 0xa0, 0xc9, 0x03, 0x49, 0xbe];
    ErrorCorrection, ERROR_CORRECTION, "error correction" = 0x75b22635, 0x668e, 0x11cf, [0xa6, 0xd9, 0x00, 0xaa, 0x00, 0x62, 0xce, 0x6c];
    ContentDescription, CONTENT_DESCRIPTION, "content description" = 0x75b22633, 0x668e, 0x11cf, [0xa6, 0xd9, 0x00, 0xaa, 0x00, 0x62, 0xce, 0x6c];
    ExtendedContentDescription, EXTENDED_CONTENT_DESCRIPTION, "extended content description" = 0xd2d0a440, 0xe307, 0x11d2, [0x97, 0xf0, 0x00, 0xa0, 0xc9, 0x5e, 0xa8, 0x50];
    StreamBitrateProperties, STREAM_BITRATE_PROPERTIES, "stream bitrate properties" = 0x7bf875ce, 0x468d, 0x11d1, [0x8d, 0x82, 0x00, 0x60, 0x97, 0xc9, 0xa2, 0xb2];
    ExtendedContentEncryption, EXTENDED_CONTENT_ENCRYPTION, "extended content encryption" = 0x298ae614, 0x2622, 0x4c17, [0xb9, 0x35, 0xda, 0xe0, 0x7e, 0xe9, 0x28, 0x9c];
    Padding, PADDING, "padding" = 0x1806d474, 0xcadf, 0x4509, [0xa4, 0xba, 0x9a, 0xab, 0xcb, 0x96, 0xaa, 0xe8];

    // stream types
    AudioMedia, AUDIO_MEDIA, "audio media" = 0xf8699e40, 0x5b4d, 0x11cf, [0xa8, 0xfd, 0x00, 0x80, 0x5f, 0x5c, 0x44, 0x2b];
    VideoMedia, VIDEO_MEDIA, "video media" = 0xbc19efc0, 0x5b4d, 0x11cf, [0xa8, 0xfd, 0x00, 0x80, 0x5f, 0x5c, 0x44, 0x2b];
    CommandMedia, COMMAND_MEDIA, "command media" = 0x59dacfc0, 0x59e6, 0x11d0, [0xa3, 0xac, 0x00, 0xa0, 0xc9, 0x03, 0x48, 0xf6];
    JfifMedia, JFIF_MEDIA, "JFIF media" = 0xb61be100, 0x5b4e, 0x11cf, [0xa8, 0xfd, 0x00, 0x80, 0x5f, 0x5c, 0x44, 0x2b];
    DegradableJpegMedia, DEGRADABLE_JPEG_MEDIA, "degradable JPEG media" = 0x35907de0, 0xe415, 0x11cf, [0xa9, 0x17, 0x00, 0x80, 0x5f, 0x5c, 0x44, 0x2b];
    FileTransferMedia, FILE_TRANSFER_MEDIA, "file transfer media" = 0x91bd222c, 0xf21c, 0x497a, [0x8b, 0x6d, 0x5a, 0xa8, 0x6b, 0xfc, 0x01, 0x85];
    BinaryMedia, BINARY_MEDIA, "binary media" = 0x3afb65e2, 0x47ef, 0x40f2, [0xac, 0x2c, 0x70, 0xa9, 0x0d, 0x71, 0xd3, 0x43];

    // error correction types
    NoErrorCorrection, NO_ERROR_CORRECTION, "no error correction" = 0x20fb5700, 0x5b55, 0x11cf, [0xa8, 0xfd, 0x00, 0x80, 0x5f, 0x5c, 0x44, 0x2b];
    AudioSpread, AUDIO_SPREAD, "audio spread" = 0xbfc3cd50, 0x618f, 0x11cf, [0x8b, 0xb2, 0x00, 0xaa, 0x00, 0xb4, 0xe2, 0x20];

    // mutual exclusion types
    MutexBitrate, MUTEX_BITRATE, "mutex bitrate" = 0xd6e22a01, 0x35da, 0x11d1, [0x90, 0x34, 0x00, 0xa0, 0xc9, 0x03, 0x49, 0xbe];
    MutexUnknown, MUTEX_UNKNOWN, "mutex unknown" = 0xd6e22a02, 0x35da, 0x11d1, [0x90, 0x34, 0x00, 0xa0, 0xc9, 0x03, 0x49, 0xbe];

    Reserved1, RESERVED_1, "reserved 1" = 0xabd3d211, 0xa9ba, 0x11cf, [0x8e, 0xe6, 0x00, 0xc0, 0x0c, 0x20, 0x53, 0x65];
    ReservedScriptCommand, RESERVED_SCRIPT_COMMAND, "reserved script command" = 0x4b1acbe3, 0x100b, 0x11d0, [0xa3, 0x9b, 0x00, 0xa0, 0xc9, 0x03, 0x48, 0xf6];
    ReservedMarker, RESERVED_MARKER, "reserved marker" = 0x4cfedb20, 0x75f6, 0x11cf, [0x9c, 0x0f, 0x00, 0xa0, 0xc9, 0x03, 0x49, 0xcb];
    AudioConcealNone, AUDIO_CONCEAL_NONE, "audio conceal none" = 0x49f1a440, 0x4ece, 0x11d0, [0xa3, 0xac, 0x00, 0xa0, 0xc9, 0x03, 0x48, 0xf6];
    CodecComment1Header, CODEC_COMMENT1_HEADER, "codec comment1 header" = 0x86d15241, 0x311d, 0x11d0, [0xa3, 0xa4, 0x00, 0xa0, 0xc9, 0x03, 0x48, 0xf6];
    Asf2Header, ASF_2_0_HEADER, "asf 2.0 header" = 0xd6e229d1, 0x35da, 0x11d1, [0x90, 0x34, 0x00, 0xa0, 0xc9, 0x03, 0x49, 0xbe];

    // header extension objects
    ExtendedStreamProperties, EXTENDED_STREAM_PROPERTIES, "extended stream properties" = 0x14e6a5cb, 0xc672, 0x4332, [0x83, 0x99, 0xa9, 0x69, 0x52, 0x06, 0x5b, 0x5a];
    AdvancedMutualExclusion, ADVANCED_MUTUAL_EXCLUSION, "advanced mutual exclusion" = 0xa08649cf, 0x4775, 0x4670, [0x8a, 0x16, 0x6e, 0x35, 0x35, 0x75, 0x66, 0xcd];
    GroupMutualExclusion, GROUP_MUTUAL_EXCLUSION, "group mutual exclusion" = 0xd1465a40, 0x5a79, 0x4338, [0xb7, 0x1b, 0xe3, 0x6b, 0x8f, 0xd6, 0xc2, 0x49];
    StreamPrioritization, STREAM_PRIORITIZATION, "stream prioritization" = 0xd4fed15b, 0x88d3, 0x454f, [0x81, 0xf0, 0xed, 0x5c, 0x45, 0x99, 0x9e, 0x24];
    BandwidthSharing, BANDWIDTH_SHARING, "bandwidth sharing" = 0xa69609e6, 0x517b, 0x11d2, [0xb6, 0xaf, 0x00, 0xc0, 0x4f, 0xd9, 0x08, 0xe9];
    LanguageList, LANGUAGE_LIST, "language list" = 0x7c4346a9, 0xefe0, 0x4bfc, [0xb2, 0x29, 0x39, 0x3e, 0xde, 0x41, 0x5c, 0x85];
    Metadata, METADATA, "metadata" = 0xc5f8cbea, 0x5baf, 0x4877, [0x84, 0x67, 0xaa, 0x8c, 0x44, 0xfa, 0x4c, 0xca];
    MetadataLibrary, METADATA_LIBRARY, "metadata library" = 0x44231c94, 0x9498, 0x49d1, [0xa1, 0x41, 0x1d, 0x13, 0x4e, 0x45, 0x70, 0x54];
    IndexParameters, INDEX_PARAMETERS, "index parameters" = 0xd6e229df, 0x35da, 0x11d1, [0x90, 0x34, 0x00, 0xa0, 0xc9, 0x03, 0x49, 0xbe];
    MediaObjectIndexParameters, MEDIA_OBJECT_INDEX_PARAMETERS, "media object index parameters" = 0x6b203bad, 0x3f11, 0x48e4, [0xac, 0xa8, 0xd7, 0x61, 0x3d, 0xe2, 0xcf, 0xa7];
    TimecodeIndexParameters, TIMECODE_INDEX_PARAMETERS, "timecode index parameters" = 0xf55e496d, 0x9797, 0x4b5d, [0x8c, 0x8b, 0x60, 0x4d, 0xf9, 0x9b, 0xfb, 0x24];
    AdvancedContentEncryption, ADVANCED_CONTENT_ENCRYPTION, "advanced content encryption" = 0x43058533, 0x6981, 0x49e6, [0x9b, 0x74, 0xad, 0x12, 0xcb, 0x86, 0xd5, 0x8c];
    Compatibility, COMPATIBILITY, "compatibility" = 0x26f18b5d, 0x4584, 0x47ec, [0x9f, 0x5f, 0x0e, 0x65, 0x1f, 0x04, 0x52, 0xc9];
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Media type carried by a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "snake_case"))]
pub enum StreamType {
    #[default]
    Unknown,
    Audio,
    Video,
    Control,
    Jfif,
    DegradableJpeg,
    FileTransfer,
    Binary,
}

impl StreamType {
    /// Map a stream-type GUID kind to a media type.
    pub fn from_kind(kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::AudioMedia => Self::Audio,
            ObjectKind::VideoMedia => Self::Video,
            ObjectKind::CommandMedia => Self::Control,
            ObjectKind::JfifMedia => Self::Jfif,
            ObjectKind::DegradableJpegMedia => Self::DegradableJpeg,
            ObjectKind::FileTransferMedia => Self::FileTransfer,
            ObjectKind::BinaryMedia => Self::Binary,
            _ => Self::Unknown,
        }
    }

    /// GUID written for this type, if it has one.
    pub fn guid(self) -> Option<Guid> {
        match self {
            Self::Unknown => None,
            Self::Audio => Some(Guid::AUDIO_MEDIA),
            Self::Video => Some(Guid::VIDEO_MEDIA),
            Self::Control => Some(Guid::COMMAND_MEDIA),
            Self::Jfif => Some(Guid::JFIF_MEDIA),
            Self::DegradableJpeg => Some(Guid::DEGRADABLE_JPEG_MEDIA),
            Self::FileTransfer => Some(Guid::FILE_TRANSFER_MEDIA),
            Self::Binary => Some(Guid::BINARY_MEDIA),
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
            Self::Control => write!(f, "control"),
            Self::Jfif => write!(f, "jfif"),
            Self::DegradableJpeg => write!(f, "degradable-jpeg"),
            Self::FileTransfer => write!(f, "file-transfer"),
            Self::Binary => write!(f, "binary"),
        }
    }
}
