// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use super::{Order, SwapInstruction, PREPARE_SWAP_ROUND};
use crate::{
    context::TraderContext, params::TraderParams, portfolio_tracker::parse_amount,
    synchronized_data::TraderData,
};
use abci_lib::{
    base_types::RoundId,
    interfaces::{ApiRequest, Behaviour, HttpCollaborator, RoundView},
    io::fetch_json_with_retries,
};
use async_trait::async_trait;
use log::{error, info};
use serde_json::Value;

pub(super) fn quote_request(params: &TraderParams, order: &Order) -> ApiRequest {
    ApiRequest::get(format!(
        "{}?inputMint={}&outputMint={}&amount={}&slippageBps={}",
        params.swap.swap_quotes_endpoint,
        order.input_mint,
        order.output_mint,
        order.amount,
        params.swap.slippage_bps
    ))
}

async fn quote(
    http: &dyn HttpCollaborator,
    params: &TraderParams,
    order: &Order,
) -> Option<SwapInstruction> {
    let request = quote_request(params, order);
    let response =
        fetch_json_with_retries(http, &request, &params.market_data.retry_policy).await?;
    let out_amount = response.get("outAmount").and_then(parse_amount);
    match out_amount {
        Some(out_amount) => Some(SwapInstruction {
            input_mint: order.input_mint.clone(),
            output_mint: order.output_mint.clone(),
            in_amount: order.amount,
            out_amount,
            slippage_bps: params.swap.slippage_bps,
        }),
        None => {
            error!("Unexpected quote for {:?}: {}", order, response);
            None
        }
    }
}

/// Quotes every order and stores the resulting instructions.
pub struct PrepareSwapBehaviour;

#[async_trait]
impl Behaviour<TraderContext> for PrepareSwapBehaviour {
    fn matching_round(&self) -> RoundId {
        PREPARE_SWAP_ROUND
    }

    async fn local_act(
        &mut self,
        context: &mut TraderContext,
        view: RoundView<'_>,
    ) -> Option<Vec<Value>> {
        let failure = vec![Value::Null, Value::Null];
        let orders_hash = match TraderData(view.synchronized_data).orders_hash() {
            Ok(Some(hash)) => hash,
            Ok(None) => return Some(vec![Value::Null, Value::Bool(false)]),
            Err(e) => {
                error!("{}", e);
                return Some(failure);
            }
        };
        let orders = match context.load(orders_hash).await {
            Some(orders) => orders,
            None => return Some(failure),
        };
        let orders: Vec<Order> = match serde_json::from_value(orders) {
            Ok(orders) => orders,
            Err(e) => {
                error!("Orders {} are malformed: {}", orders_hash, e);
                return Some(failure);
            }
        };
        if orders.is_empty() {
            return Some(vec![Value::Null, Value::Bool(false)]);
        }

        let params = context.params.clone();
        let mut instructions = Vec::new();
        for order in &orders {
            if let Some(instruction) = quote(context.http.as_ref(), &params, order).await {
                instructions.push(instruction);
            }
        }
        if instructions.is_empty() {
            error!("None of the {} order(s) could be quoted", orders.len());
            return Some(failure);
        }
        let incomplete = instructions.len() < orders.len();
        info!(
            "Prepared {} instruction(s) out of {} order(s)",
            instructions.len(),
            orders.len()
        );
        let instructions = match serde_json::to_value(&instructions) {
            Ok(instructions) => instructions,
            Err(e) => {
                error!("Could not serialize the instructions: {}", e);
                return Some(failure);
            }
        };
        match context.save(&instructions).await {
            Some(hash) => Some(vec![Value::from(hash), Value::Bool(incomplete)]),
            None => Some(failure),
        }
    }
}
