use rdkafka::message::Message;

/// A record as delivered by the broker client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub topic: String,
    pub value: Vec<u8>,
    pub partition: Option<i32>,
    pub offset: Option<i64>,
}

impl Record {
    pub fn new(topic: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            value: value.into(),
            partition: None,
            offset: None,
        }
    }

    pub fn with_position(mut self, partition: i32, offset: i64) -> Self {
        self.partition = Some(partition);
        self.offset = Some(offset);
        self
    }

    /// Copies a consumed message. A missing payload becomes an empty value,
    /// which fails to decode and takes the dead-letter path like any other
    /// malformed message.
    pub fn from_message<M: Message>(message: &M) -> Self {
        Self {
            topic: message.topic().to_string(),
            value: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            partition: Some(message.partition()),
            offset: Some(message.offset()),
        }
    }
}

/// The unit of work handed to the router. The value stays undecoded until the
/// router needs it, so a failed task can be republished byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub topic: String,
    pub value: Vec<u8>,
    pub partition: Option<i32>,
    pub offset: Option<i64>,
}

impl From<Record> for Task {
    fn from(record: Record) -> Self {
        Self {
            topic: record.topic,
            value: record.value,
            partition: record.partition,
            offset: record.offset,
        }
    }
}
