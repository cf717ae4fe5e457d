//! # alnkit
//!
//! 以差异列表表示比对记录的 Rust 工具库。
//!
//! 一条比对不再保存完整的 read 序列，而是保存它相对参考序列的差异
//! （错配、插入、缺失、跳过、剪切、填充）。本 crate 提供：
//!
//! - **差异编解码**：CIGAR + read + 参考 ⇄ 差异列表 ⇄ read 序列
//! - **比对记录**：坐标、标志位、属性与有序差异列表
//! - **SAM 转换**：逐行解析与格式化
//! - **紧凑存储**：丢弃可重建的 read 序列，bincode 序列化
//!
//! ## 快速示例
//!
//! ```rust
//! use alnkit::alignment::{differences_from_cigar, sequence_from_differences, Cigar, STORE_ALL};
//!
//! let reference = b"ACGTACGTAC";
//! let read = b"ACTTACGT";
//! let cigar: Cigar = "8M".parse().unwrap();
//!
//! let diffs = differences_from_cigar(&cigar, Some(&read[..]), reference, 0, STORE_ALL).unwrap();
//! assert_eq!(diffs.len(), 1);
//!
//! let rebuilt = sequence_from_differences(&diffs, read.len(), reference, 0).unwrap();
//! assert_eq!(rebuilt, read);
//! ```
//!
//! ## 模块说明
//!
//! - [`alignment`]：CIGAR、差异、编解码与比对记录
//! - [`io`]：行读取（含 gzip）、FASTA 参考、SAM 行
//! - [`store`]：bincode 存储格式
//! - [`pipeline`]：分批并行的 pack / unpack / check / diff

pub mod alignment;
pub mod io;
pub mod pipeline;
pub mod store;
