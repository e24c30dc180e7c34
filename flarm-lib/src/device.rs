use crate::codec::{Frame, FrameDecoder, escape};
use crate::config::FlarmConfig;
use crate::constants::{
    ACK_SEQUENCE_SIZE, CHUNK_DATA_OFFSET, CHUNK_PROGRESS_OFFSET, END_OF_DATA, MIN_CHUNK_SIZE, START_BYTE,
};
use crate::error::{FlarmError, FrameError};
use crate::header::FrameHeader;
use crate::message::MessageType;
use crate::operation::OperationEnvironment;
use crate::record::{RecordedFlightInfo, RecordedFlightList, parse_record_info};
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, trace, warn};

const READ_CHUNK_SIZE: usize = 256;

/// Positions reported while walking the record list cycle through `0..10`
const LIST_PROGRESS_RANGE: u32 = 10;

const DOWNLOAD_PROGRESS_RANGE: u32 = 100;

/// An ACK or NACK matched to the request it answers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub message_type: MessageType,
    /// De-escaped payload, starting with the echoed sequence number
    pub payload: Bytes,
}

impl Reply {
    /// Payload after the echoed sequence number
    pub fn data(&self) -> &[u8] {
        self.payload.get(ACK_SEQUENCE_SIZE..).unwrap_or_default()
    }
}

/// One `GETIGCDATA` answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataChunk<'a> {
    /// Transfer progress in percent, clamped to 100
    pub progress: u8,
    /// IGC bytes, without the end-of-data marker
    pub data: &'a [u8],
    pub is_last: bool,
}

impl<'a> DataChunk<'a> {
    /// Split an ACK payload: `[seq lo][seq hi][progress][data..][0x1A?]`
    pub fn parse(payload: &'a [u8]) -> Result<Self, FlarmError> {
        if payload.len() < MIN_CHUNK_SIZE {
            return Err(FlarmError::InsufficientData {
                expected: MIN_CHUNK_SIZE,
                actual: payload.len(),
            });
        }

        let progress = payload[CHUNK_PROGRESS_OFFSET].min(100);
        let mut data = &payload[CHUNK_DATA_OFFSET..];
        let is_last = data.last() == Some(&END_OF_DATA);
        if is_last {
            data = &data[..data.len() - 1];
        }

        Ok(Self { progress, data, is_last })
    }
}

/// A FLARM in binary mode, reachable over `port`.
///
/// The device owns the per-connection sequence counter. Every operation
/// takes `&mut self`, so only one request can be outstanding at a time.
pub struct FlarmDevice<P> {
    port: P,
    decoder: FrameDecoder,
    sequence_number: u16,
    config: FlarmConfig,
}

impl<P: AsyncRead + AsyncWrite + Unpin> FlarmDevice<P> {
    pub fn new(port: P) -> Self {
        Self::with_config(port, FlarmConfig::default())
    }

    pub fn with_config(port: P, config: FlarmConfig) -> Self {
        Self {
            port,
            decoder: FrameDecoder::new(),
            sequence_number: 0,
            config,
        }
    }

    pub fn config(&self) -> &FlarmConfig {
        &self.config
    }

    pub fn into_inner(self) -> P {
        self.port
    }

    /// Empty list sized according to the configuration
    pub fn new_flight_list(&self) -> RecordedFlightList {
        RecordedFlightList::with_capacity(self.config.list_capacity)
    }

    fn next_sequence_number(&mut self) -> u16 {
        let sequence_number = self.sequence_number;
        self.sequence_number = self.sequence_number.wrapping_add(1);
        sequence_number
    }

    /// Header for the next request, consuming one sequence number
    pub fn prepare_header(&mut self, message_type: MessageType, payload: &[u8]) -> FrameHeader {
        let sequence_number = self.next_sequence_number();
        FrameHeader::new(sequence_number, message_type, payload)
    }

    async fn write_with_timeout(&mut self, bytes: &[u8], duration: Duration) -> Result<(), FlarmError> {
        let port = &mut self.port;
        timeout(duration, async {
            port.write_all(bytes).await?;
            port.flush().await
        })
        .await??;
        Ok(())
    }

    pub async fn send_start_byte(&mut self) -> Result<(), FlarmError> {
        let duration = self.config.control_timeout;
        self.write_with_timeout(&[START_BYTE], duration).await
    }

    pub async fn send_frame_header(&mut self, header: &FrameHeader, duration: Duration) -> Result<(), FlarmError> {
        self.send_escaped(&header.to_bytes(), duration).await
    }

    /// Write `data` byte-stuffed
    pub async fn send_escaped(&mut self, data: &[u8], duration: Duration) -> Result<(), FlarmError> {
        let escaped = escape(data);
        trace!("-> {}", hex::encode(&escaped));
        self.write_with_timeout(&escaped, duration).await
    }

    /// Send a complete request frame and return its sequence number
    async fn send_request(&mut self, message_type: MessageType, payload: &[u8]) -> Result<u16, FlarmError> {
        let duration = self.config.control_timeout;
        let header = self.prepare_header(message_type, payload);
        debug!(
            sequence = header.sequence_number(),
            len = payload.len(),
            "Sending {}",
            message_type
        );

        self.send_start_byte().await?;
        self.send_frame_header(&header, duration).await?;
        if !payload.is_empty() {
            self.send_escaped(payload, duration).await?;
        }
        Ok(header.sequence_number())
    }

    /// Next decoded frame, or the reason the last one was rejected
    async fn receive_frame(&mut self) -> Result<Result<Frame, FrameError>, FlarmError> {
        let mut buffer = [0u8; READ_CHUNK_SIZE];
        loop {
            if let Some(frame) = self.decoder.next_frame() {
                return Ok(frame);
            }

            let n = self.port.read(&mut buffer).await?;
            if n == 0 {
                return Err(FlarmError::ConnectionClosed);
            }
            trace!("<- {}", hex::encode(&buffer[..n]));
            self.decoder.push(&buffer[..n]);
        }
    }

    /// Wait for the ACK or NACK answering request `sequence`.
    ///
    /// Malformed frames, frames of other types and acknowledgements for
    /// other sequence numbers are discarded; waiting continues until
    /// `duration` has elapsed in total.
    pub async fn wait_for_reply(&mut self, sequence: u16, duration: Duration) -> Result<Reply, FlarmError> {
        let deadline = Instant::now() + duration;
        loop {
            let frame = match timeout_at(deadline, self.receive_frame()).await?? {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Discarding malformed frame: {}", e);
                    continue;
                }
            };

            let message_type = frame.message_type();
            if !message_type.is_acknowledgement() {
                debug!(
                    sequence = frame.sequence_number(),
                    "Ignoring {} while waiting for ACK/NACK", message_type
                );
                continue;
            }

            match frame.acknowledged_sequence() {
                Some(acknowledged) if acknowledged == sequence => {
                    debug!(sequence, len = frame.payload.len(), "Received {}", message_type);
                    return Ok(Reply {
                        message_type,
                        payload: frame.payload,
                    });
                }
                Some(acknowledged) => {
                    warn!(
                        expected = sequence,
                        received = acknowledged,
                        "Discarding {} for another request", message_type
                    );
                }
                None => warn!("Discarding {} without sequence number", message_type),
            }
        }
    }

    pub async fn wait_for_ack_or_nack(&mut self, sequence: u16, duration: Duration) -> Result<MessageType, FlarmError> {
        Ok(self.wait_for_reply(sequence, duration).await?.message_type)
    }

    /// Check that the device answers in binary mode
    pub async fn ping(&mut self) -> Result<(), FlarmError> {
        let sequence = self.send_request(MessageType::Ping, &[]).await?;
        match self.wait_for_ack_or_nack(sequence, self.config.control_timeout).await? {
            MessageType::Ack => Ok(()),
            other => Err(FlarmError::UnexpectedResponse(other)),
        }
    }

    /// Leave binary mode. The device does not acknowledge this.
    pub async fn exit_binary_mode(&mut self) -> Result<(), FlarmError> {
        self.send_request(MessageType::Exit, &[]).await?;
        info!("Requested exit from binary mode");
        Ok(())
    }

    /// Select record `index` for the following info/data requests.
    /// NACK means there is no such record.
    pub async fn select_flight(&mut self, index: u8) -> Result<MessageType, FlarmError> {
        let sequence = self.send_request(MessageType::SelectRecord, &[index]).await?;
        self.wait_for_ack_or_nack(sequence, self.config.control_timeout).await
    }

    /// Read the info line of the currently selected record and tag it with
    /// `index`. Malformed info text is an error here.
    pub async fn read_flight_info(&mut self, index: u8) -> Result<RecordedFlightInfo, FlarmError> {
        let sequence = self.send_request(MessageType::GetRecordInfo, &[]).await?;
        let reply = self.wait_for_reply(sequence, self.config.control_timeout).await?;

        if reply.message_type != MessageType::Ack {
            return Err(FlarmError::UnexpectedResponse(reply.message_type));
        }
        if reply.data().is_empty() {
            return Err(FlarmError::InsufficientData {
                expected: ACK_SEQUENCE_SIZE + 1,
                actual: reply.payload.len(),
            });
        }

        let text = String::from_utf8_lossy(reply.data());
        let text = text.trim_end_matches('\0');
        parse_record_info(text, index).ok_or_else(|| FlarmError::InvalidRecordInfo(text.to_string()))
    }

    /// Fill `list` with the records stored on the device, in device order.
    ///
    /// Stops at the first NACK or when the list is full. Records whose info
    /// cannot be read are skipped.
    pub async fn read_flight_list(
        &mut self,
        list: &mut RecordedFlightList,
        env: &mut dyn OperationEnvironment,
    ) -> Result<(), FlarmError> {
        env.set_progress_range(LIST_PROGRESS_RANGE);

        for index in 0..=u8::MAX {
            if list.is_full() {
                break;
            }
            env.set_progress_position(u32::from(index) % LIST_PROGRESS_RANGE);

            if env.is_cancelled() {
                return Err(FlarmError::Cancelled);
            }
            let ack_result = self.select_flight(index).await?;

            if ack_result == MessageType::Nack {
                debug!(index, "No more records");
                break;
            }
            if ack_result != MessageType::Ack {
                return Err(FlarmError::UnexpectedResponse(ack_result));
            }
            if env.is_cancelled() {
                return Err(FlarmError::Cancelled);
            }

            let result = self.read_flight_info(index).await;
            if env.is_cancelled() {
                return Err(FlarmError::Cancelled);
            }
            match result {
                Ok(flight) => {
                    debug!("Found flight {}", flight);
                    if list.push(flight).is_err() {
                        break;
                    }
                }
                Err(e) => warn!(index, "Skipping record: {}", e),
            }
        }

        info!(count = list.len(), "Read flight list");
        Ok(())
    }

    /// Download the currently selected record into `path`.
    ///
    /// Does not remove `path` on failure; see [`FlarmDevice::download_flight`].
    pub async fn download_selected_flight(
        &mut self,
        path: &Path,
        env: &mut dyn OperationEnvironment,
    ) -> Result<(), FlarmError> {
        if env.is_cancelled() {
            return Err(FlarmError::Cancelled);
        }
        let mut writer = BufWriter::new(File::create(path).await?);

        env.set_progress_range(DOWNLOAD_PROGRESS_RANGE);
        let mut total = 0usize;
        loop {
            if env.is_cancelled() {
                return Err(FlarmError::Cancelled);
            }
            let sequence = self.send_request(MessageType::GetIgcData, &[]).await?;
            let reply = self.wait_for_reply(sequence, self.config.data_timeout).await?;
            if env.is_cancelled() {
                return Err(FlarmError::Cancelled);
            }
            if reply.message_type != MessageType::Ack {
                return Err(FlarmError::UnexpectedResponse(reply.message_type));
            }

            let chunk = DataChunk::parse(&reply.payload)?;
            env.set_progress_position(chunk.progress.into());
            writer.write_all(chunk.data).await?;
            total += chunk.data.len();

            if chunk.is_last {
                break;
            }
        }

        writer.flush().await?;
        info!(bytes = total, path = %path.display(), "IGC file downloaded");
        Ok(())
    }

    /// Select `flight` and download it into `path`.
    ///
    /// On any failure the partially written file is deleted.
    pub async fn download_flight(
        &mut self,
        flight: &RecordedFlightInfo,
        path: &Path,
        env: &mut dyn OperationEnvironment,
    ) -> Result<(), FlarmError> {
        if env.is_cancelled() {
            return Err(FlarmError::Cancelled);
        }
        let ack_result = self.select_flight(flight.index).await?;
        if ack_result != MessageType::Ack {
            return Err(FlarmError::UnexpectedResponse(ack_result));
        }
        if env.is_cancelled() {
            return Err(FlarmError::Cancelled);
        }

        let result = self.download_selected_flight(path, env).await;
        if result.is_err() {
            remove_partial_file(path).await;
        }
        result
    }
}

async fn remove_partial_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed partial download"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), "Failed to remove partial download: {}", e),
    }
}
