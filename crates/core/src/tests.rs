// AtomSim - Cycle-Accurate SoC Simulation Backend
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

#[cfg(test)]
mod tests {
    use crate::metrics::PerformanceMetrics;
    use crate::model::{ReplayModel, ReplayScript, Step};
    use crate::peripherals::uart::{UartStatus, REG_CLKDIV, REG_DATA, REG_STATUS, RX_EMPTY};
    use crate::transcript::SharedBuffer;
    use crate::{
        AccessError, Backend, BackendConfig, ConfigError, HardwareModel, MemPort, PortId,
        TickStatus, UartConfig,
    };
    use std::sync::Arc;

    const IMEM: u32 = 0x0001_0000;
    const DMEM: u32 = 0x2000_0000;
    const UART: u32 = 0x4000_0000;

    /// Ports are driven by hand; records what the backend answered.
    #[derive(Debug, Default)]
    struct RigModel {
        ports: [MemPort; 2],
        clocks: u64,
        halt_at: Option<(u64, u32)>,
        /// Drop `valid` once a request has been acked.
        one_shot: bool,
        halted: Option<u32>,
        acks: Vec<(u64, PortId, u32)>,
    }

    impl RigModel {
        fn drive(&mut self, id: PortId, port: MemPort) {
            self.ports[id.index()] = port;
        }
    }

    impl HardwareModel for RigModel {
        fn port(&self, id: PortId) -> &MemPort {
            &self.ports[id.index()]
        }

        fn port_mut(&mut self, id: PortId) -> &mut MemPort {
            &mut self.ports[id.index()]
        }

        fn clock(&mut self) {
            for id in PortId::ALL {
                let port = &mut self.ports[id.index()];
                if port.valid && port.ack {
                    self.acks.push((self.clocks, id, port.rdata));
                    if self.one_shot {
                        port.valid = false;
                    }
                }
            }
            self.clocks += 1;
            if let Some((at, code)) = self.halt_at {
                if self.clocks >= at {
                    self.halted = Some(code);
                }
            }
        }

        fn halted(&self) -> Option<u32> {
            self.halted
        }
    }

    fn read_port(addr: u32, sel: u8) -> MemPort {
        MemPort {
            addr,
            sel,
            valid: true,
            ..Default::default()
        }
    }

    fn write_port(addr: u32, wdata: u32, sel: u8) -> MemPort {
        MemPort {
            addr,
            wdata,
            sel,
            we: true,
            valid: true,
            ..Default::default()
        }
    }

    /// 64 KiB imem/dmem and a 1000 Hz / 100 baud UART: 10 cycles/bit, 100 per byte.
    fn config() -> BackendConfig {
        BackendConfig {
            imem_offset: IMEM,
            imem_size_kb: 64,
            dmem_offset: DMEM,
            dmem_size_kb: 64,
            uart_base: UART,
            uart: Some(UartConfig {
                transcript: true,
                ..UartConfig::new("ttyS0", 100)
            }),
            clock_hz: 1000,
        }
    }

    fn rig() -> Backend<RigModel> {
        Backend::new(RigModel::default(), config()).unwrap()
    }

    #[test]
    fn test_store_fetch_roundtrip() {
        let mut backend = rig();
        backend.store(IMEM, &[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();

        let mut buf = [0u8; 4];
        backend.fetch(IMEM, &mut buf).unwrap();
        assert_eq!(buf, [0xDE, 0xAD, 0xBE, 0xEF]);

        backend.store(DMEM + 0x20, &[1, 2, 3, 4]).unwrap();
        backend.fetch(DMEM + 0x20, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);

        // One byte below imem is unmapped.
        let err = backend.fetch(0x0000_FFFF, &mut buf).unwrap_err();
        assert_eq!(err, AccessError::OutOfRange { addr: 0x0000_FFFF });
    }

    #[test]
    fn test_bulk_access_splits_across_adjacent_regions() {
        let mut cfg = config();
        cfg.dmem_offset = IMEM + 64 * 1024;
        let mut backend = Backend::new(RigModel::default(), cfg).unwrap();

        let boundary = IMEM + 64 * 1024;
        backend.store(boundary - 2, &[1, 2, 3, 4]).unwrap();

        let mut buf = [0u8; 4];
        backend.fetch(boundary - 2, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);

        let mut tail = [0u8; 2];
        backend.fetch(boundary, &mut tail).unwrap();
        assert_eq!(tail, [3, 4]);
    }

    #[test]
    fn test_store_past_region_end_keeps_committed_prefix() {
        let mut backend = rig();
        let end = DMEM + 64 * 1024;

        let err = backend.store(end - 2, &[0xAA, 0xBB, 0xCC]).unwrap_err();
        assert_eq!(err, AccessError::OutOfRange { addr: end });

        let mut buf = [0u8; 2];
        backend.fetch(end - 2, &mut buf).unwrap();
        assert_eq!(buf, [0xAA, 0xBB]);
    }

    #[test]
    fn test_empty_bulk_access_is_ok_anywhere() {
        let mut backend = rig();
        backend.store(0xFFFF_FFFF, &[]).unwrap();
        backend.fetch(0, &mut []).unwrap();
    }

    #[test]
    fn test_port_read_returns_lane_aligned_data() {
        let mut model = RigModel::default();
        model.drive(PortId::Data, read_port(DMEM, 0b1100));
        let mut backend = Backend::new(model, config()).unwrap();
        backend.store(DMEM, &[0x11, 0x22, 0x33, 0x44]).unwrap();

        assert!(backend.tick().is_clean());
        assert_eq!(backend.model().acks, vec![(0, PortId::Data, 0x4433_0000)]);
        assert!(backend.model().port(PortId::Data).ack);
    }

    #[test]
    fn test_port_write_uses_byte_enables() {
        let mut model = RigModel::default();
        model.drive(PortId::Data, write_port(DMEM + 4, 0xAABB_CCDD, 0b0110));
        let mut backend = Backend::new(model, config()).unwrap();

        assert!(backend.tick().is_clean());
        let mut buf = [0u8; 4];
        backend.fetch(DMEM + 4, &mut buf).unwrap();
        assert_eq!(buf, [0x00, 0xCC, 0xBB, 0x00]);
    }

    #[test]
    fn test_idle_port_is_not_acked() {
        let mut backend = rig();
        assert!(backend.tick().is_clean());
        assert!(!backend.model().port(PortId::Instruction).ack);
        assert!(!backend.model().port(PortId::Data).ack);
        assert!(backend.model().acks.is_empty());
        assert_eq!(backend.state().iport.requests, 0);
    }

    #[test]
    fn test_instruction_port_serviced_first() {
        // Both ports hit the same word in one cycle: the instruction port
        // reads before the data port writes.
        let mut model = RigModel::default();
        model.drive(PortId::Instruction, read_port(DMEM, 0xF));
        model.drive(PortId::Data, write_port(DMEM, 0x1234_5678, 0xF));
        let mut backend = Backend::new(model, config()).unwrap();
        backend.store(DMEM, &[0xEF, 0xBE, 0xAD, 0xDE]).unwrap();

        backend.tick();
        let acks = &backend.model().acks;
        assert_eq!(acks[0], (0, PortId::Instruction, 0xDEAD_BEEF));
        assert_eq!(acks[1], (0, PortId::Data, 0));

        // Next cycle the instruction port sees the data port's write.
        backend.tick();
        assert_eq!(backend.model().acks[2], (1, PortId::Instruction, 0x1234_5678));
    }

    #[test]
    fn test_faults_do_not_abort_tick() {
        let mut model = RigModel::default();
        model.drive(PortId::Instruction, read_port(0x0000_0000, 0xF));
        model.drive(PortId::Data, write_port(DMEM, 0x55, 0b0001));
        let mut backend = Backend::new(model, config()).unwrap();

        let TickStatus::Faulted(faults) = backend.tick() else {
            panic!("expected a fault");
        };
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].port, PortId::Instruction);
        assert_eq!(faults[0].cycle, 0);
        assert_eq!(faults[0].error, AccessError::OutOfRange { addr: 0 });

        // The faulting request is acked with zero; the data write still landed.
        assert_eq!(backend.model().acks[0], (0, PortId::Instruction, 0));
        let mut byte = [0u8];
        backend.fetch(DMEM, &mut byte).unwrap();
        assert_eq!(byte, [0x55]);
        assert_eq!(backend.cycles(), 1);
        assert_eq!(backend.state().total_faults, 1);
    }

    #[test]
    fn test_malformed_byte_enables_fault() {
        let mut model = RigModel::default();
        // Last byte of dmem is still in range.
        let last = DMEM + 64 * 1024 - 1;
        model.drive(PortId::Data, read_port(last & !3, 0b1000));
        let mut backend = Backend::new(model, config()).unwrap();
        assert!(backend.tick().is_clean());

        let mut model = RigModel::default();
        model.drive(PortId::Data, write_port(DMEM + 64 * 1024 - 4, 0, 0b1010));
        let mut backend = Backend::new(model, config()).unwrap();
        let TickStatus::Faulted(faults) = backend.tick() else {
            panic!("non-contiguous byte enables must fault");
        };
        assert!(faults[0].request.is_none());
        assert!(matches!(faults[0].error, AccessError::MisalignedSpan { .. }));
    }

    #[test]
    fn test_uart_transmit_timing_through_backend() {
        let mut model = RigModel {
            one_shot: true,
            ..Default::default()
        };
        model.drive(PortId::Data, write_port(UART + REG_DATA, b'A' as u32, 0b0001));
        let mut backend = Backend::new(model, config()).unwrap();
        let byte_ticks = backend.uart().unwrap().byte_ticks() as u64;
        assert_eq!(byte_ticks, 100);

        // Serviced at T = 0, then the port goes idle.
        backend.tick();
        assert!(!backend.model().port(PortId::Data).valid);

        while backend.cycles() < byte_ticks - 1 {
            backend.tick();
        }
        let status = UartStatus::from_bits_truncate(backend.state().uart.as_ref().unwrap().status);
        assert!(status.contains(UartStatus::TX_BUSY));
        assert!(backend.transcript().unwrap().contents().is_empty());

        backend.tick();
        assert_eq!(backend.cycles(), byte_ticks);
        let status = UartStatus::from_bits_truncate(backend.state().uart.as_ref().unwrap().status);
        assert!(!status.contains(UartStatus::TX_BUSY));
        assert_eq!(backend.transcript().unwrap().contents(), b"A");
    }

    #[test]
    fn test_uart_double_write_transmits_last_byte_only() {
        let mut backend = rig();
        backend.store(UART + REG_DATA, b"X").unwrap();
        backend.tick();
        backend.store(UART + REG_DATA, b"Y").unwrap();

        for _ in 0..250 {
            backend.tick();
        }
        assert_eq!(backend.transcript().unwrap().contents(), b"Y");
        assert_eq!(backend.uart().unwrap().bytes_transmitted(), 1);
    }

    #[test]
    fn test_uart_receive_and_clkdiv() {
        let mut backend = rig();
        assert!(backend.uart_host_send(b"z"));

        let mut data = [0u8];
        backend.fetch(UART + REG_DATA, &mut data).unwrap();
        assert_eq!(data, [RX_EMPTY]);

        for _ in 0..100 {
            backend.tick();
        }
        let mut status = [0u8];
        backend.fetch(UART + REG_STATUS, &mut status).unwrap();
        assert_eq!(status[0] & UartStatus::RX_VALID.bits(), UartStatus::RX_VALID.bits());
        backend.fetch(UART + REG_DATA, &mut data).unwrap();
        assert_eq!(data, [b'z']);

        let mut clkdiv = [0u8; 4];
        backend.fetch(UART + REG_CLKDIV, &mut clkdiv).unwrap();
        assert_eq!(u32::from_le_bytes(clkdiv), 8);

        backend.store(UART + REG_CLKDIV, &3u32.to_le_bytes()).unwrap();
        assert_eq!(backend.uart().unwrap().byte_ticks(), 50);
    }

    #[test]
    fn test_missing_uart_maps_idle_window() {
        let mut cfg = config();
        cfg.uart = None;
        let mut model = RigModel::default();
        model.drive(PortId::Data, read_port(UART + REG_DATA, 0b0001));
        let mut backend = Backend::new(model, cfg).unwrap();

        assert!(backend.uart().is_none());
        assert!(!backend.uart_host_send(b"ignored"));
        assert!(backend.tick().is_clean());
        assert_eq!(backend.model().acks[0].2, RX_EMPTY as u32);

        backend.store(UART + REG_DATA, b"!").unwrap();
        assert!(backend.state().uart.is_none());
    }

    #[test]
    fn test_halt_stops_clocking() {
        let mut model = RigModel::default();
        model.halt_at = Some((3, 7));
        let mut backend = Backend::new(model, config()).unwrap();

        assert_eq!(backend.tick(), TickStatus::Clean);
        assert_eq!(backend.tick(), TickStatus::Clean);
        assert_eq!(backend.tick(), TickStatus::Halted(7));
        assert_eq!(backend.state().halted, Some(7));

        assert_eq!(backend.tick(), TickStatus::Halted(7));
        assert_eq!(backend.cycles(), 3);
        assert_eq!(backend.model().clocks, 3);
    }

    #[test]
    fn test_halt_wins_over_faults_in_same_tick() {
        let mut model = RigModel::default();
        model.halt_at = Some((1, 2));
        model.drive(PortId::Data, read_port(0x9000_0000, 0xF));
        let mut backend = Backend::new(model, config()).unwrap();

        assert_eq!(backend.tick(), TickStatus::Halted(2));
        assert_eq!(backend.last_faults().len(), 1);
    }

    #[test]
    fn test_refresh_state_is_idempotent() {
        let mut model = RigModel::default();
        model.drive(PortId::Data, write_port(UART, b'q' as u32, 0b0001));
        let mut backend = Backend::new(model, config()).unwrap();
        backend.tick();

        let before = backend.state().clone();
        let uart_ticks = backend.uart().unwrap().ticks();
        backend.refresh_state();
        backend.refresh_state();
        assert_eq!(backend.state(), &before);
        assert_eq!(backend.uart().unwrap().ticks(), uart_ticks);
        assert_eq!(before.dport.requests, 1);
        assert_eq!(before.cycles, 1);
    }

    #[test]
    fn test_snapshot_serializes_to_json() {
        let backend = rig();
        let json = serde_json::to_value(backend.state()).unwrap();
        assert_eq!(json["cycles"], 0);
        assert_eq!(json["uart"]["name"], "ttyS0");
        assert!(json["halted"].is_null());
    }

    #[test]
    fn test_config_errors() {
        let mut cfg = config();
        cfg.dmem_offset = IMEM + 0x100;
        assert!(matches!(
            Backend::new(RigModel::default(), cfg).unwrap_err(),
            ConfigError::Overlap { .. }
        ));

        let mut cfg = config();
        cfg.imem_size_kb = 0;
        assert_eq!(
            Backend::new(RigModel::default(), cfg).unwrap_err(),
            ConfigError::ZeroSizeRegion {
                name: "imem".to_string()
            }
        );

        let mut cfg = config();
        cfg.dmem_offset = 0xFFFF_0000;
        cfg.dmem_size_kb = 128;
        assert!(matches!(
            Backend::new(RigModel::default(), cfg).unwrap_err(),
            ConfigError::ExceedsAddressSpace { .. }
        ));

        // A full 4 GiB region does not fit a 32-bit size.
        let mut cfg = config();
        cfg.imem_offset = 0;
        cfg.imem_size_kb = 4 * 1024 * 1024;
        assert_eq!(
            Backend::new(RigModel::default(), cfg).unwrap_err(),
            ConfigError::ExceedsAddressSpace {
                name: "imem".to_string(),
                base: 0,
                size: 1 << 32,
            }
        );

        let mut cfg = config();
        cfg.uart_base = DMEM + 0x10;
        assert!(matches!(
            Backend::new(RigModel::default(), cfg).unwrap_err(),
            ConfigError::Overlap { .. }
        ));

        let mut cfg = config();
        cfg.uart.as_mut().unwrap().baud_rate = 0;
        assert_eq!(
            Backend::new(RigModel::default(), cfg).unwrap_err(),
            ConfigError::InvalidBaudRate
        );

        let mut cfg = config();
        cfg.clock_hz = 0;
        assert_eq!(
            Backend::new(RigModel::default(), cfg).unwrap_err(),
            ConfigError::InvalidClock
        );
    }

    #[test]
    fn test_attach_transcript_replaces_builtin_buffer() {
        let mut backend = rig();
        let buf = SharedBuffer::unbounded();
        assert!(backend.attach_transcript(Box::new(buf.clone())));
        assert!(backend.transcript().is_none());

        backend.store(UART, b"k").unwrap();
        for _ in 0..100 {
            backend.tick();
        }
        assert_eq!(buf.contents(), b"k");
    }

    #[test]
    fn test_observers_see_requests_and_faults() {
        let mut model = RigModel::default();
        model.drive(PortId::Instruction, read_port(IMEM, 0xF));
        model.drive(PortId::Data, read_port(0x8000_0000, 0xF));
        let mut backend = Backend::new(model, config()).unwrap();
        let metrics = Arc::new(PerformanceMetrics::new());
        backend.add_observer(metrics.clone());

        for _ in 0..5 {
            backend.tick();
        }
        assert_eq!(metrics.get_ticks(), 5);
        assert_eq!(metrics.get_requests(PortId::Instruction), 5);
        assert_eq!(metrics.get_requests(PortId::Data), 5);
        assert_eq!(metrics.get_faults(), 5);
    }

    #[test]
    fn test_replay_hello_over_uart() {
        let mut data = Vec::new();
        for &b in b"hi" {
            data.push(Step::Poll {
                addr: UART + REG_STATUS,
                mask: UartStatus::TX_BUSY.bits() as u32,
                value: 0,
                sel: 0xF,
            });
            data.push(Step::Write {
                addr: UART + REG_DATA,
                data: b as u32,
                sel: 0b0001,
            });
        }
        data.push(Step::Poll {
            addr: UART + REG_STATUS,
            mask: UartStatus::TX_BUSY.bits() as u32,
            value: 0,
            sel: 0xF,
        });
        data.push(Step::Halt(0));

        let model = ReplayModel::new(ReplayScript {
            instruction: vec![Step::Read { addr: IMEM, sel: 0xF }],
            data,
        });
        let mut backend = Backend::new(model, config()).unwrap();
        backend.store(IMEM, &0x0000_0013u32.to_le_bytes()).unwrap();

        let mut status = TickStatus::Clean;
        for _ in 0..1000 {
            status = backend.tick();
            if status.is_halted() {
                break;
            }
        }
        assert_eq!(status, TickStatus::Halted(0));
        assert_eq!(backend.transcript().unwrap().contents(), b"hi");
        assert_eq!(backend.model().reads()[0].value, 0x13);
        assert_eq!(backend.state().core.retired, 1);
    }
}
