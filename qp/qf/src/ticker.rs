//! Tick-processing active object

use core::marker::PhantomData;

use qp_core::Evt;
use qp_qep::{QHsm, QStateMachine, QStateReturn};

use crate::active::ActiveContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickerState {
    Top,
    Ticking,
}

/// Active object that runs [`QF::tick`](crate::QF::tick) for one rate
/// whenever it receives any user event.
///
/// Lets interrupt code hand tick processing over to task level by posting a
/// static event instead of walking the time-event lists itself.
pub struct QTicker<P> {
    hsm: QHsm<TickerState>,
    rate: u8,
    _payload: PhantomData<fn() -> P>,
}

impl<P> QTicker<P> {
    pub fn new(rate: u8) -> Self {
        Self {
            hsm: QHsm::new(),
            rate,
            _payload: PhantomData,
        }
    }

    pub fn rate(&self) -> u8 {
        self.rate
    }
}

impl<P> QStateMachine for QTicker<P> {
    type State = TickerState;
    type Payload = P;
    type Context = ActiveContext<P>;

    const TOP: TickerState = TickerState::Top;

    fn hsm(&self) -> &QHsm<TickerState> {
        &self.hsm
    }

    fn hsm_mut(&mut self) -> &mut QHsm<TickerState> {
        &mut self.hsm
    }

    fn initial(&mut self, _par: Option<&Evt<'_, P>>, _ctx: &ActiveContext<P>) -> QStateReturn<TickerState> {
        QStateReturn::Tran(TickerState::Ticking)
    }

    fn handle(&mut self, state: TickerState, e: &Evt<'_, P>, ctx: &ActiveContext<P>) -> QStateReturn<TickerState> {
        match state {
            TickerState::Ticking if !e.sig().is_reserved() => {
                ctx.qf().tick(self.rate);
                QStateReturn::Handled
            }
            _ => QStateReturn::Super(TickerState::Top),
        }
    }
}
