//! 分块传输引擎
//!
//! 设备内部 ARM 处理器只有 256 字节的暂存缓冲区，任何批量传输都必须拆成
//! 不超过该长度的分块，按顺序逐个发送/接收。
//!
//! ```text
//! num_bytes = 300, chunk_size = 256
//! chunk 0: [0, 256)
//! chunk 1: [256, 300)
//! ```

use std::ops::Range;
use std::time::Duration;

use sipm_protocol::{CHUNK_SIZE, TRANSFER_TIMEOUT_MS};
use thiserror::Error;
use tracing::{trace, warn};

use crate::Transport;
use crate::error::TransportError;

/// 分块计划：按顺序产出每个分块的字节区间
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    total: usize,
    chunk_size: usize,
    offset: usize,
}

/// 生成分块计划
///
/// `floor(n / chunk_size)` 个完整分块，加上一个 `n % chunk_size` 字节的尾块（为零时省略）。
/// `chunk_size` 为 0 时按 1 处理。
pub fn chunk_plan(num_bytes: usize, chunk_size: usize) -> ChunkPlan {
    ChunkPlan {
        total: num_bytes,
        chunk_size: chunk_size.max(1),
        offset: 0,
    }
}

impl Iterator for ChunkPlan {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.total {
            return None;
        }
        let start = self.offset;
        let end = (start + self.chunk_size).min(self.total);
        self.offset = end;
        Some(start..end)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.total - self.offset).div_ceil(self.chunk_size);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChunkPlan {}

/// 短分块处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ShortChunkPolicy {
    /// 记录日志后继续下一个分块（设备既有行为）
    #[default]
    Continue,
    /// 遇到第一个短分块即中止
    Abort,
}

/// 一个实际字节数与请求不符的分块
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortChunk {
    pub chunk: usize,
    pub offset: usize,
    pub expected: usize,
    pub actual: usize,
}

/// 单次逻辑传输的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    /// 请求的总字节数
    pub requested: usize,
    /// 后端报告的实际字节数之和
    pub transferred: usize,
    /// 已执行的分块数
    pub chunks: usize,
    /// 短分块记录
    pub short_chunks: Vec<ShortChunk>,
}

impl TransferReport {
    /// 所有分块是否都完整传输
    pub fn is_complete(&self) -> bool {
        self.short_chunks.is_empty()
    }
}

/// 分块传输错误
#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("Chunk {chunk} at offset {offset} failed: {source}")]
    Transport {
        chunk: usize,
        offset: usize,
        source: TransportError,
    },

    #[error("Chunk {chunk} transferred {actual} of {expected} bytes")]
    ShortChunk {
        chunk: usize,
        expected: usize,
        actual: usize,
    },
}

impl ChunkError {
    /// 底层传输错误（短分块时为 `None`）
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            ChunkError::Transport { source, .. } => Some(source),
            ChunkError::ShortChunk { .. } => None,
        }
    }
}

/// 分块传输引擎
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkedTransfer {
    chunk_size: usize,
    timeout: Duration,
    policy: ShortChunkPolicy,
}

impl Default for ChunkedTransfer {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            timeout: Duration::from_millis(TRANSFER_TIMEOUT_MS),
            policy: ShortChunkPolicy::Continue,
        }
    }
}

impl ChunkedTransfer {
    pub fn new(chunk_size: usize, timeout: Duration, policy: ShortChunkPolicy) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            timeout,
            policy,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn policy(&self) -> ShortChunkPolicy {
        self.policy
    }

    /// 分块写出 `data` 到 OUT 端点
    pub fn write<T: Transport>(
        &self,
        transport: &mut T,
        handle: &mut T::Handle,
        endpoint: u8,
        data: &[u8],
    ) -> Result<TransferReport, ChunkError> {
        let mut report = TransferReport {
            requested: data.len(),
            ..Default::default()
        };

        for (chunk, range) in chunk_plan(data.len(), self.chunk_size).enumerate() {
            let offset = range.start;
            let expected = range.len();
            let actual = transport
                .bulk_write(handle, endpoint, &data[range], self.timeout)
                .map_err(|source| ChunkError::Transport {
                    chunk,
                    offset,
                    source,
                })?;
            self.record(&mut report, endpoint, chunk, offset, expected, actual)?;
        }

        Ok(report)
    }

    /// 从 IN 端点分块读入 `buf`
    pub fn read<T: Transport>(
        &self,
        transport: &mut T,
        handle: &mut T::Handle,
        endpoint: u8,
        buf: &mut [u8],
    ) -> Result<TransferReport, ChunkError> {
        let mut report = TransferReport {
            requested: buf.len(),
            ..Default::default()
        };

        for (chunk, range) in chunk_plan(buf.len(), self.chunk_size).enumerate() {
            let offset = range.start;
            let expected = range.len();
            let actual = transport
                .bulk_read(handle, endpoint, &mut buf[range], self.timeout)
                .map_err(|source| ChunkError::Transport {
                    chunk,
                    offset,
                    source,
                })?;
            self.record(&mut report, endpoint, chunk, offset, expected, actual)?;
        }

        Ok(report)
    }

    fn record(
        &self,
        report: &mut TransferReport,
        endpoint: u8,
        chunk: usize,
        offset: usize,
        expected: usize,
        actual: usize,
    ) -> Result<(), ChunkError> {
        report.chunks += 1;
        report.transferred += actual;

        if actual == expected {
            trace!(
                "EP 0x{:02X} chunk {} [{}..{}) ok",
                endpoint,
                chunk,
                offset,
                offset + expected
            );
            return Ok(());
        }

        warn!(
            "EP 0x{:02X} chunk {}: transferred {} of {} bytes",
            endpoint, chunk, actual, expected
        );
        report.short_chunks.push(ShortChunk {
            chunk,
            offset,
            expected,
            actual,
        });

        match self.policy {
            ShortChunkPolicy::Continue => Ok(()),
            ShortChunkPolicy::Abort => Err(ChunkError::ShortChunk {
                chunk,
                expected,
                actual,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeviceAddress;
    use sipm_protocol::{CMD_OUT_EP, DATA_IN_EP, DATA_OUT_EP};

    /// 记录每次调用的最小后端
    #[derive(Default)]
    struct Recorder {
        calls: Vec<(u8, usize)>,
        short_at: Option<(usize, usize)>,
        fail_at: Option<usize>,
    }

    impl Recorder {
        fn step(&mut self, endpoint: u8, len: usize) -> Result<usize, TransportError> {
            let index = self.calls.len();
            self.calls.push((endpoint, len));
            if self.fail_at == Some(index) {
                return Err(TransportError::Timeout);
            }
            match self.short_at {
                Some((at, actual)) if at == index => Ok(actual),
                _ => Ok(len),
            }
        }
    }

    impl Transport for Recorder {
        type Device = ();
        type Handle = ();

        fn devices(&mut self) -> Result<Vec<()>, TransportError> {
            Ok(vec![()])
        }

        fn device_address(&self, _device: &()) -> DeviceAddress {
            DeviceAddress::default()
        }

        fn open(&mut self, _device: &()) -> Result<(), TransportError> {
            Ok(())
        }

        fn claim_interface(&mut self, _handle: &mut (), _interface: u8) -> Result<(), TransportError> {
            Ok(())
        }

        fn bulk_write(
            &mut self,
            _handle: &mut (),
            endpoint: u8,
            data: &[u8],
            _timeout: Duration,
        ) -> Result<usize, TransportError> {
            self.step(endpoint, data.len())
        }

        fn bulk_read(
            &mut self,
            _handle: &mut (),
            endpoint: u8,
            buf: &mut [u8],
            _timeout: Duration,
        ) -> Result<usize, TransportError> {
            buf.fill(0xAA);
            self.step(endpoint, buf.len())
        }

        fn close(&mut self, _handle: ()) {}
    }

    #[test]
    fn test_chunk_plan_exact_multiple() {
        let plan = chunk_plan(4096, 256);
        assert_eq!(plan.len(), 16);
        let ranges: Vec<_> = plan.collect();
        assert_eq!(ranges.len(), 16);
        assert!(ranges.iter().all(|r| r.len() == 256));
        assert_eq!(ranges[15], 3840..4096);
    }

    #[test]
    fn test_chunk_plan_leftover() {
        let ranges: Vec<_> = chunk_plan(300, 256).collect();
        assert_eq!(ranges, vec![0..256, 256..300]);
    }

    #[test]
    fn test_chunk_plan_small_and_empty() {
        let ranges: Vec<_> = chunk_plan(64, 256).collect();
        assert_eq!(ranges, vec![0..64]);
        assert_eq!(chunk_plan(0, 256).count(), 0);
        assert_eq!(chunk_plan(3, 0).count(), 3);
    }

    #[test]
    fn test_write_chunks_in_order() {
        let mut backend = Recorder::default();
        let data = vec![1u8; 16384];
        let report = ChunkedTransfer::default()
            .write(&mut backend, &mut (), DATA_OUT_EP, &data)
            .unwrap();

        assert_eq!(report.chunks, 64);
        assert_eq!(report.requested, 16384);
        assert_eq!(report.transferred, 16384);
        assert!(report.is_complete());
        assert!(backend.calls.iter().all(|&(ep, len)| ep == DATA_OUT_EP && len == 256));
    }

    #[test]
    fn test_short_chunk_continues_by_default() {
        let mut backend = Recorder {
            short_at: Some((0, 100)),
            ..Default::default()
        };
        let mut buf = vec![0u8; 300];
        let report = ChunkedTransfer::default()
            .read(&mut backend, &mut (), DATA_IN_EP, &mut buf)
            .unwrap();

        assert_eq!(backend.calls, vec![(DATA_IN_EP, 256), (DATA_IN_EP, 44)]);
        assert_eq!(report.transferred, 144);
        assert_eq!(
            report.short_chunks,
            vec![ShortChunk {
                chunk: 0,
                offset: 0,
                expected: 256,
                actual: 100,
            }]
        );
        assert!(!report.is_complete());
    }

    #[test]
    fn test_short_chunk_abort_policy() {
        let mut backend = Recorder {
            short_at: Some((1, 10)),
            ..Default::default()
        };
        let engine = ChunkedTransfer::new(256, Duration::from_millis(5), ShortChunkPolicy::Abort);
        let err = engine
            .write(&mut backend, &mut (), DATA_OUT_EP, &[0u8; 1024])
            .unwrap_err();

        assert!(matches!(
            err,
            ChunkError::ShortChunk {
                chunk: 1,
                expected: 256,
                actual: 10
            }
        ));
        assert_eq!(backend.calls.len(), 2);
        assert!(err.transport_error().is_none());
    }

    #[test]
    fn test_transport_error_aborts_immediately() {
        let mut backend = Recorder {
            fail_at: Some(2),
            ..Default::default()
        };
        let mut buf = vec![0u8; 4096];
        let err = ChunkedTransfer::default()
            .read(&mut backend, &mut (), DATA_IN_EP, &mut buf)
            .unwrap_err();

        match &err {
            ChunkError::Transport { chunk, offset, source } => {
                assert_eq!(*chunk, 2);
                assert_eq!(*offset, 512);
                assert!(source.is_timeout());
            },
            other => panic!("Expected Transport error, got {:?}", other),
        }
        assert_eq!(backend.calls.len(), 3);
    }

    #[test]
    fn test_command_packet_is_single_chunk() {
        let mut backend = Recorder::default();
        let report = ChunkedTransfer::default()
            .write(&mut backend, &mut (), CMD_OUT_EP, &[0u8; 64])
            .unwrap();
        assert_eq!(report.chunks, 1);
        assert_eq!(backend.calls, vec![(CMD_OUT_EP, 64)]);
    }

    #[test]
    fn test_configured_chunk_size() {
        let mut backend = Recorder::default();
        let engine = ChunkedTransfer::new(64, Duration::from_millis(10), ShortChunkPolicy::Continue);
        engine.write(&mut backend, &mut (), DATA_OUT_EP, &[0u8; 200]).unwrap();
        let lens: Vec<usize> = backend.calls.iter().map(|&(_, len)| len).collect();
        assert_eq!(lens, vec![64, 64, 64, 8]);
        assert_eq!(engine.timeout(), Duration::from_millis(10));
    }
}
