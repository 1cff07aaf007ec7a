#![no_std]

use arbitrary_int::{u3, u5, u6, u7, Number};
use bitbybit::bitfield;
use embedded_hal::spi::{self, Operation, SpiDevice};
use heapless::Vec;
use log::{debug, info, warn};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// Registers in use and nothing else.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive,
)]
#[repr(u8)]
pub enum Addr {
    Cfr1 = 0x00,
    Cfr2 = 0x01,
    Cfr3 = 0x02,
    AuxDac = 0x03,
    Profile0 = 0x0e,
    Profile1 = 0x0f,
    Profile2 = 0x10,
    Profile3 = 0x11,
    Profile4 = 0x12,
    Profile5 = 0x13,
    Profile6 = 0x14,
    Profile7 = 0x15,
}

impl Addr {
    pub fn profile(profile: u3) -> Self {
        [
            Self::Profile0,
            Self::Profile1,
            Self::Profile2,
            Self::Profile3,
            Self::Profile4,
            Self::Profile5,
            Self::Profile6,
            Self::Profile7,
        ][profile.value() as usize]
    }

    /// Register width in bytes
    pub fn width(&self) -> usize {
        match self {
            Self::Cfr1 | Self::Cfr2 | Self::Cfr3 | Self::AuxDac => 4,
            _ => 8,
        }
    }
}

#[bitfield(u8, default = 0x00)]
#[derive(Debug, PartialEq)]
pub struct Instruction {
    #[bits(0..=4, rw)]
    pub addr: u5,
    #[bit(7, rw)]
    pub read: bool,
}

#[bitfield(u32, default = 0x0000_0000)]
#[derive(Debug, PartialEq)]
pub struct Cfr1 {
    #[bit(13, rw)]
    pub clear_cci: bool,
}

#[bitfield(u32, default = 0x0040_0000)]
#[derive(Debug, PartialEq)]
pub struct Cfr2 {
    /// Parallel data port clock output
    #[bit(11, rw)]
    pub pdclk_enable: bool,
    /// Offset binary instead of two's complement I/Q data
    #[bit(12, rw)]
    pub offset_binary: bool,
    /// PDCLK at half the I/Q word rate, data latched on both edges
    #[bit(13, rw)]
    pub pdclk_ddr: bool,
    #[bit(22, rw)]
    pub sync_clk_enable: bool,
}

#[bitfield(u32, default = 0x0000_0000)]
#[derive(Debug, PartialEq)]
pub struct Cfr3 {
    #[bits(1..=7, rw)]
    pub n: u7,
    #[bit(8, rw)]
    pub pll_enable: bool,
    #[bit(14, rw)]
    pub refclk_div_resetb: bool,
    #[bit(15, rw)]
    pub refclk_div_bypass: bool,
    #[bits(19..=21, rw)]
    pub icp: u3,
    #[bits(24..=26, rw)]
    pub vco_sel: u3,
    #[bit(27, rw)]
    pub vco_enable: bool,
}

#[bitfield(u32, default = 0x0000_007f)]
#[derive(Debug, PartialEq)]
pub struct AuxDac {
    /// DAC full scale current
    #[bits(0..=7, rw)]
    pub fsc: u8,
}

/// QDUC single tone profile
#[bitfield(u64, default = 0)]
#[derive(Debug, PartialEq)]
pub struct Profile {
    #[bits(0..=31, rw)]
    pub ftw: u32,
    #[bits(32..=47, rw)]
    pub pow: u16,
    /// Output scale factor
    #[bits(48..=55, rw)]
    pub scale: u8,
    #[bit(56, rw)]
    pub inverse_cci_bypass: bool,
    #[bit(57, rw)]
    pub spectral_invert: bool,
    /// CCI interpolation rate
    #[bits(58..=63, rw)]
    pub interpolation: u6,
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unsupported register {0:#04x}")]
    Register(u8),
    #[error("Register width {0}, got {1} bytes")]
    Width(usize, usize),
    #[error("Frequency out of range")]
    Frequency,
    #[error("SPI")]
    Bus(spi::ErrorKind),
}

impl<E: spi::Error> From<E> for Error {
    fn from(value: E) -> Self {
        Self::Bus(value.kind())
    }
}

/// Frequency tuning word, rounded to nearest.
///
/// No range check: frequencies beyond the 32 bit range saturate.
pub fn frequency_to_ftw(frequency: f64, sysclk: f64) -> u32 {
    let fstep = sysclk / (1u64 << 32) as f64;
    (frequency / fstep + 0.5) as u32
}

/// Frequency tuning word for `0 <= frequency < sysclk/2`.
pub fn checked_frequency_to_ftw(
    frequency: f64,
    sysclk: f64,
) -> Result<u32, Error> {
    if !(sysclk.is_finite() && sysclk > 0.0)
        || !(frequency >= 0.0 && frequency < sysclk / 2.0)
    {
        return Err(Error::Frequency);
    }
    Ok(frequency_to_ftw(frequency, sysclk))
}

pub fn ftw_to_frequency(ftw: u32, sysclk: f64) -> f64 {
    ftw as f64 * (sysclk / (1u64 << 32) as f64)
}

/// Startup configuration
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Setup {
    /// Reference clock in Hz
    pub refclk: f64,
    /// PLL multiplier. Zero bypasses the PLL.
    pub multiplier: u7,
    pub vco: u3,
    pub charge_pump: u3,
    /// Auxiliary DAC full scale current code
    pub fsc: u8,
    /// Output frequency in Hz for all profiles
    pub frequency: f64,
    pub interpolation: u6,
    pub inverse_cci_bypass: bool,
    pub scale: u8,
    pub pow: u16,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            refclk: 25e6,
            multiplier: u7::new(12),
            vco: u3::new(0),
            charge_pump: u3::new(7),
            fsc: 0xff,
            frequency: 99.9e6,
            interpolation: u6::new(40),
            inverse_cci_bypass: true,
            scale: 0x80,
            pow: 0,
        }
    }
}

impl Setup {
    pub fn pll(&self) -> bool {
        self.multiplier.value() != 0
    }

    pub fn sysclk(&self) -> f64 {
        if self.pll() {
            self.refclk * self.multiplier.value() as f64
        } else {
            self.refclk
        }
    }

    pub fn cfr1(&self) -> Cfr1 {
        Cfr1::default().with_clear_cci(true)
    }

    pub fn cfr2(&self) -> Cfr2 {
        Cfr2::default()
            .with_pdclk_enable(true)
            .with_offset_binary(true)
            .with_pdclk_ddr(true)
    }

    pub fn cfr3(&self) -> Cfr3 {
        let pll = self.pll();
        Cfr3::default()
            .with_vco_enable(pll)
            .with_vco_sel(self.vco)
            .with_icp(self.charge_pump)
            .with_refclk_div_bypass(true)
            .with_refclk_div_resetb(true)
            .with_pll_enable(pll)
            .with_n(self.multiplier)
    }

    pub fn aux_dac(&self) -> AuxDac {
        AuxDac::default().with_fsc(self.fsc)
    }

    pub fn profile(&self, ftw: u32) -> Profile {
        Profile::default()
            .with_interpolation(self.interpolation)
            .with_spectral_invert(false)
            .with_inverse_cci_bypass(self.inverse_cci_bypass)
            .with_scale(self.scale)
            .with_pow(self.pow)
            .with_ftw(ftw)
    }
}

/// Outcome of the best-effort initialization
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InitReport {
    pub sysclk: f64,
    pub ftw: u32,
    /// Number of failed register transactions
    pub faults: u32,
    /// Last profile as read back from the chip
    pub readback: Option<Profile>,
}

impl InitReport {
    fn check<T>(&mut self, addr: Addr, res: Result<T, Error>) -> Option<T> {
        res.map_err(|err| {
            warn!("{addr:?}: {err}");
            self.faults += 1;
        })
        .ok()
    }
}

#[derive(Clone, Debug)]
pub struct Ad9957<B> {
    bus: B,
}

impl<B: SpiDevice<u8>> Ad9957<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn free(self) -> B {
        self.bus
    }

    fn instruction(addr: Addr, read: bool) -> u8 {
        Instruction::default()
            .with_addr(u5::new(addr.into()))
            .with_read(read)
            .raw_value()
    }

    pub fn write(&mut self, addr: Addr, data: &[u8]) -> Result<(), Error> {
        if data.len() != addr.width() {
            return Err(Error::Width(addr.width(), data.len()));
        }
        debug!("{addr:?} <- {data:02x?}");
        Ok(self.bus.transaction(&mut [
            Operation::Write(&[Self::instruction(addr, false)]),
            Operation::Write(data),
        ])?)
    }

    pub fn read(&mut self, addr: Addr, data: &mut [u8]) -> Result<(), Error> {
        if data.len() != addr.width() {
            return Err(Error::Width(addr.width(), data.len()));
        }
        self.bus.transaction(&mut [
            Operation::Write(&[Self::instruction(addr, true)]),
            Operation::Read(data),
        ])?;
        debug!("{addr:?} -> {data:02x?}");
        Ok(())
    }

    /// Write a register by raw address.
    pub fn send_register(
        &mut self,
        addr: u8,
        data: &[u8],
    ) -> Result<(), Error> {
        let addr = Addr::try_from(addr).or(Err(Error::Register(addr)))?;
        self.write(addr, data)
    }

    /// Read a register by raw address.
    pub fn read_register(&mut self, addr: u8) -> Result<Vec<u8, 8>, Error> {
        let addr = Addr::try_from(addr).or(Err(Error::Register(addr)))?;
        let mut data = [0; 8];
        let data = &mut data[..addr.width()];
        self.read(addr, data)?;
        Vec::from_slice(data).or(Err(Error::Width(8, data.len())))
    }

    pub fn set_cfr1(&mut self, cfr1: Cfr1) -> Result<(), Error> {
        self.write(Addr::Cfr1, &cfr1.raw_value().to_be_bytes())
    }

    pub fn set_cfr2(&mut self, cfr2: Cfr2) -> Result<(), Error> {
        self.write(Addr::Cfr2, &cfr2.raw_value().to_be_bytes())
    }

    pub fn set_cfr3(&mut self, cfr3: Cfr3) -> Result<(), Error> {
        self.write(Addr::Cfr3, &cfr3.raw_value().to_be_bytes())
    }

    pub fn set_aux_dac(&mut self, aux_dac: AuxDac) -> Result<(), Error> {
        self.write(Addr::AuxDac, &aux_dac.raw_value().to_be_bytes())
    }

    pub fn set_profile(
        &mut self,
        profile: u3,
        value: Profile,
    ) -> Result<(), Error> {
        self.write(Addr::profile(profile), &value.raw_value().to_be_bytes())
    }

    pub fn profile(&mut self, profile: u3) -> Result<Profile, Error> {
        let mut r = [0; 8];
        self.read(Addr::profile(profile), &mut r)?;
        Ok(Profile::new_with_raw_value(u64::from_be_bytes(r)))
    }

    /// Retune one profile, keeping its other settings.
    pub fn set_frequency(
        &mut self,
        profile: u3,
        frequency: f64,
        sysclk: f64,
    ) -> Result<u32, Error> {
        let ftw = checked_frequency_to_ftw(frequency, sysclk)?;
        let value = self.profile(profile)?.with_ftw(ftw);
        self.set_profile(profile, value)?;
        Ok(ftw)
    }

    /// Configure the chip and program all profiles with the same tone.
    ///
    /// Only an invalid [`Setup`] is an error and it is detected before any
    /// bus traffic. Failed transactions are logged and counted but do not
    /// stop the sequence: there is nobody to report them to.
    pub fn init(&mut self, setup: &Setup) -> Result<InitReport, Error> {
        let sysclk = setup.sysclk();
        let ftw = checked_frequency_to_ftw(setup.frequency, sysclk)?;
        let mut report = InitReport {
            sysclk,
            ftw,
            faults: 0,
            readback: None,
        };

        for (addr, value) in [
            (Addr::Cfr1, setup.cfr1().raw_value()),
            (Addr::Cfr2, setup.cfr2().raw_value()),
            (Addr::Cfr3, setup.cfr3().raw_value()),
            (Addr::AuxDac, setup.aux_dac().raw_value()),
        ] {
            report.check(addr, self.write(addr, &value.to_be_bytes()));
        }

        let profile = setup.profile(ftw);
        for i in 0..8 {
            let p = u3::new(i);
            report.check(Addr::profile(p), self.set_profile(p, profile));
        }

        report.readback = report
            .check(Addr::profile(u3::MAX), self.profile(u3::MAX))
            .inspect(|have| {
                info!(
                    "{:?}: {:02x?}",
                    Addr::profile(u3::MAX),
                    have.raw_value().to_be_bytes()
                )
            });

        info!(
            "AD9957 initialized: SYSCLK {} Hz, FTW {:#010x} ({} faults)",
            sysclk, ftw, report.faults
        );
        Ok(report)
    }
}

#[cfg(test)]
mod test {
    extern crate std;

    use super::*;
    use rand::{prelude::*, rngs::StdRng};
    use std::{vec, vec::Vec};

    /// Register file behind a recording SPI device.
    #[derive(Default)]
    struct Chip {
        regs: [[u8; 8]; 32],
        transactions: Vec<Vec<u8>>,
        /// Fail this many transactions before working.
        fail: usize,
    }

    impl spi::ErrorType for Chip {
        type Error = spi::ErrorKind;
    }

    impl SpiDevice<u8> for Chip {
        fn transaction(
            &mut self,
            operations: &mut [Operation<'_, u8>],
        ) -> Result<(), spi::ErrorKind> {
            if self.fail > 0 {
                self.fail -= 1;
                return Err(spi::ErrorKind::Other);
            }
            let (insn, data) = match operations {
                [Operation::Write(insn), data] => (insn[0], data),
                _ => panic!("unexpected transaction"),
            };
            let addr = (insn & 0x1f) as usize;
            let mut log = vec![insn];
            match data {
                Operation::Write(data) if insn & 0x80 == 0 => {
                    self.regs[addr][..data.len()].copy_from_slice(*data);
                    log.extend_from_slice(*data);
                }
                Operation::Read(data) if insn & 0x80 != 0 => {
                    data.copy_from_slice(&self.regs[addr][..data.len()]);
                }
                _ => panic!("direction mismatch"),
            }
            self.transactions.push(log);
            Ok(())
        }
    }

    #[test]
    fn instruction() {
        assert_eq!(Ad9957::<Chip>::instruction(Addr::Cfr3, false), 0x02);
        assert_eq!(Ad9957::<Chip>::instruction(Addr::Profile0, true), 0x8e);
        assert_eq!(Ad9957::<Chip>::instruction(Addr::Profile7, true), 0x95);
    }

    #[test]
    fn widths() {
        assert_eq!(Addr::try_from(0x00).unwrap().width(), 4);
        assert_eq!(Addr::try_from(0x0e).unwrap().width(), 8);
        assert_eq!(Addr::profile(u3::new(3)), Addr::Profile3);
        assert!(Addr::try_from(0x04).is_err());
    }

    #[test]
    fn init_sequence() {
        let mut dds = Ad9957::new(Chip::default());
        let report = dds.init(&Setup::default()).unwrap();
        assert_eq!(report.faults, 0);
        assert_eq!(report.sysclk, 300e6);
        assert_eq!(report.ftw, 0x553f_7cee);

        let chip = dds.free();
        let mut want = vec![
            vec![0x00, 0x00, 0x00, 0x20, 0x00],
            vec![0x01, 0x00, 0x40, 0x38, 0x00],
            vec![0x02, 0x08, 0x38, 0xc1, 0x18],
            vec![0x03, 0x00, 0x00, 0x00, 0xff],
        ];
        for i in 0..8 {
            want.push(vec![
                0x0e + i,
                0xa1,
                0x80,
                0x00,
                0x00,
                0x55,
                0x3f,
                0x7c,
                0xee,
            ]);
        }
        want.push(vec![0x95]);
        assert_eq!(chip.transactions, want);
        assert_eq!(
            report.readback.unwrap(),
            Setup::default().profile(0x553f_7cee)
        );
    }

    #[test]
    fn init_without_pll() {
        let setup = Setup {
            multiplier: u7::new(0),
            frequency: 0.1e6,
            ..Default::default()
        };
        let mut dds = Ad9957::new(Chip::default());
        let report = dds.init(&setup).unwrap();
        assert_eq!(report.sysclk, 25e6);
        assert_eq!(report.ftw, 0x0106_24dd);
        assert_eq!(
            dds.free().transactions[2],
            vec![0x02, 0x00, 0x38, 0xc0, 0x00]
        );
    }

    #[test]
    fn init_is_best_effort() {
        let mut dds = Ad9957::new(Chip {
            fail: 2,
            ..Default::default()
        });
        let report = dds.init(&Setup::default()).unwrap();
        assert_eq!(report.faults, 2);
        assert!(report.readback.is_some());
        // CFR1 and CFR2 lost, everything after went out.
        let chip = dds.free();
        assert_eq!(chip.transactions.len(), 2 + 8 + 1);
        assert_eq!(chip.transactions[0][0], 0x02);
    }

    #[test]
    fn init_rejects_frequency_before_traffic() {
        let setup = Setup {
            frequency: 150e6,
            ..Default::default()
        };
        let mut dds = Ad9957::new(Chip::default());
        assert_eq!(dds.init(&setup), Err(Error::Frequency));
        assert!(dds.free().transactions.is_empty());
    }

    #[test]
    fn raw_access() {
        let mut dds = Ad9957::new(Chip::default());
        dds.send_register(0x00, &[0, 0, 0x20, 0]).unwrap();
        assert_eq!(&dds.read_register(0x00).unwrap()[..], &[0, 0, 0x20, 0]);
        assert_eq!(dds.read_register(0x0e).unwrap().len(), 8);
        assert_eq!(dds.read_register(0x04), Err(Error::Register(0x04)));
        assert_eq!(
            dds.send_register(0x20, &[0; 4]),
            Err(Error::Register(0x20))
        );
        assert_eq!(dds.send_register(0x0e, &[0; 4]), Err(Error::Width(8, 4)));
        assert_eq!(dds.free().transactions.len(), 3);
    }

    #[test]
    fn retune() {
        let mut dds = Ad9957::new(Chip::default());
        let p = u3::new(5);
        dds.set_profile(p, Setup::default().profile(1)).unwrap();
        let ftw = dds.set_frequency(p, 75e6, 300e6).unwrap();
        assert_eq!(ftw, 0x4000_0000);
        let have = dds.profile(p).unwrap();
        assert_eq!(have.ftw(), ftw);
        assert_eq!(have.interpolation(), u6::new(40));
        assert_eq!(dds.set_frequency(p, -1.0, 300e6), Err(Error::Frequency));
    }

    #[test]
    fn ftw_edges() {
        assert_eq!(frequency_to_ftw(0.0, 300e6), 0);
        assert_eq!(checked_frequency_to_ftw(0.0, 300e6), Ok(0));
        assert_eq!(
            checked_frequency_to_ftw(150e6, 300e6),
            Err(Error::Frequency)
        );
        assert_eq!(
            checked_frequency_to_ftw(f64::NAN, 300e6),
            Err(Error::Frequency)
        );
        assert_eq!(checked_frequency_to_ftw(1e6, 0.0), Err(Error::Frequency));
        assert_eq!(
            checked_frequency_to_ftw(150e6 - 1.0, 300e6).unwrap(),
            0x7fff_fff2
        );
    }

    #[test]
    fn ftw_round_trip() {
        let mut rng = StdRng::seed_from_u64(42);
        for sysclk in [25e6, 300e6, 1e9] {
            let fstep = sysclk / (1u64 << 32) as f64;
            for _ in 0..10_000 {
                let f = rng.gen_range(0.0..sysclk / 2.0);
                let ftw = checked_frequency_to_ftw(f, sysclk).unwrap();
                assert_eq!(ftw, frequency_to_ftw(f, sysclk));
                let err = (ftw_to_frequency(ftw, sysclk) - f).abs();
                assert!(err <= fstep, "{f} {ftw} {err}");
                // Nearest
                assert!(err <= 0.5 * fstep * (1.0 + 1e-3));
            }
        }
    }

    #[test]
    fn ftw_bytes() {
        let ftw = frequency_to_ftw(99.9e6, 300e6);
        assert_eq!(ftw.to_be_bytes(), [0x55, 0x3f, 0x7c, 0xee]);
        assert_eq!(frequency_to_ftw(99.9e6, 300e6), ftw);
    }
}
