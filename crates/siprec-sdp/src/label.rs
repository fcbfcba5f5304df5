use smol_str::SmolStr;

/// The kinds of media the recorder mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
    /// Real-time text (RFC 4103).
    Text,
    /// MSRP messaging (RFC 4975).
    Msrp,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Text => "text",
            MediaKind::Msrp => "msrp",
        }
    }
}

/// Fixed stream label numbering used in the offer SDP (`a=label`) and in
/// the recording metadata.
///
/// Odd labels carry media the recorded endpoint received from the remote
/// party; even labels carry media it sent. The integer value appears
/// verbatim on the wire and never changes across re-negotiations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum MediaLabel {
    ReceivedAudio = 1,
    SentAudio = 2,
    ReceivedVideo = 3,
    SentVideo = 4,
    ReceivedText = 5,
    SentText = 6,
    ReceivedMsrp = 7,
    SentMsrp = 8,
}

impl MediaLabel {
    /// All labels in numeric order.
    pub const ALL: [MediaLabel; 8] = [
        MediaLabel::ReceivedAudio,
        MediaLabel::SentAudio,
        MediaLabel::ReceivedVideo,
        MediaLabel::SentVideo,
        MediaLabel::ReceivedText,
        MediaLabel::SentText,
        MediaLabel::ReceivedMsrp,
        MediaLabel::SentMsrp,
    ];

    /// Returns the numeric label value (1…8).
    pub fn value(&self) -> u8 {
        *self as u8
    }

    /// Returns the label rendered for `a=label:` and metadata use.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaLabel::ReceivedAudio => "1",
            MediaLabel::SentAudio => "2",
            MediaLabel::ReceivedVideo => "3",
            MediaLabel::SentVideo => "4",
            MediaLabel::ReceivedText => "5",
            MediaLabel::SentText => "6",
            MediaLabel::ReceivedMsrp => "7",
            MediaLabel::SentMsrp => "8",
        }
    }

    /// Looks a label up by its numeric value.
    pub fn from_value(value: u8) -> Option<Self> {
        Self::ALL.get(value.checked_sub(1)? as usize).copied()
    }

    /// The received-direction label for a media kind.
    pub fn received_for(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Audio => MediaLabel::ReceivedAudio,
            MediaKind::Video => MediaLabel::ReceivedVideo,
            MediaKind::Text => MediaLabel::ReceivedText,
            MediaKind::Msrp => MediaLabel::ReceivedMsrp,
        }
    }

    /// The sent-direction label for a media kind.
    pub fn sent_for(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Audio => MediaLabel::SentAudio,
            MediaKind::Video => MediaLabel::SentVideo,
            MediaKind::Text => MediaLabel::SentText,
            MediaKind::Msrp => MediaLabel::SentMsrp,
        }
    }

    /// True for odd (received-from-remote) labels.
    pub fn is_received(&self) -> bool {
        self.value() % 2 == 1
    }

    /// True for even (sent-to-remote) labels.
    pub fn is_sent(&self) -> bool {
        !self.is_received()
    }

    /// The media kind this label belongs to.
    pub fn kind(&self) -> MediaKind {
        match self {
            MediaLabel::ReceivedAudio | MediaLabel::SentAudio => MediaKind::Audio,
            MediaLabel::ReceivedVideo | MediaLabel::SentVideo => MediaKind::Video,
            MediaLabel::ReceivedText | MediaLabel::SentText => MediaKind::Text,
            MediaLabel::ReceivedMsrp | MediaLabel::SentMsrp => MediaKind::Msrp,
        }
    }

    /// The label for the opposite direction of the same kind.
    pub fn partner(&self) -> Self {
        if self.is_received() {
            Self::sent_for(self.kind())
        } else {
            Self::received_for(self.kind())
        }
    }
}

impl From<MediaLabel> for SmolStr {
    fn from(label: MediaLabel) -> Self {
        SmolStr::new(label.as_str())
    }
}

impl std::fmt::Display for MediaLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
